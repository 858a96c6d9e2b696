use ibc_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use prost::Message;
use tracing::debug;

use crate::chain::cosmos::query::abci_query;
use crate::chain::cosmos::retry::retry_transient;
use crate::chain::cosmos::types::account::Account;
use crate::chain::rpc::RpcClient;
use crate::error::Error;
use crate::util::retry::RetryPolicy;

pub const ACCOUNT_QUERY_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";
pub const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";

/// Get a `&mut Account` from an `&mut Option<Account>` if it holds a resolved
/// account. Otherwise query for the account information, update the `Option`
/// and return the underlying `&mut` reference.
pub async fn get_or_fetch_account<'a>(
    rpc_client: &dyn RpcClient,
    retry: &RetryPolicy,
    account_address: &str,
    m_account: &'a mut Option<Account>,
) -> Result<&'a mut Account, Error> {
    let resolved = m_account.as_ref().map_or(false, Account::is_resolved);

    if !resolved {
        let account = Account::from(query_account(rpc_client, retry, account_address).await?);

        debug!(
            number = %account.number,
            sequence = %account.sequence,
            "retrieved account",
        );

        *m_account = Some(account);
    }

    m_account
        .as_mut()
        .ok_or_else(|| Error::empty_query_account(account_address.to_string()))
}

/// Queries the auth module for the account behind `account_address`.
pub async fn query_account(
    rpc_client: &dyn RpcClient,
    retry: &RetryPolicy,
    account_address: &str,
) -> Result<BaseAccount, Error> {
    let request = QueryAccountRequest {
        address: account_address.to_string(),
    };
    let data = request.encode_to_vec();

    let response = retry_transient(retry, "account query", || {
        abci_query(
            rpc_client,
            ACCOUNT_QUERY_PATH.to_string(),
            data.clone(),
            None,
            false,
        )
    })
    .await?;

    let response = QueryAccountResponse::decode(response.value.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("QueryAccountResponse"), e))?;

    // Querying for an account might fail, i.e. if the account doesn't actually exist
    let resp_account = match response.account {
        Some(account) => account,
        None => return Err(Error::empty_query_account(account_address.to_string())),
    };

    if resp_account.type_url == BASE_ACCOUNT_TYPE_URL {
        BaseAccount::decode(resp_account.value.as_slice())
            .map_err(|e| Error::protobuf_decode(String::from("BaseAccount"), e))
    } else {
        Err(Error::unknown_account_type(resp_account.type_url))
    }
}
