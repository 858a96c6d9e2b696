use ibc_proto::google::protobuf::Any;
use tendermint::Hash as TxHash;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::cosmos::encode::sign_and_encode_tx;
use crate::chain::cosmos::estimate::estimate_gas;
use crate::chain::cosmos::gas::gas_limit_to_fee;
use crate::chain::cosmos::query::account::get_or_fetch_account;
use crate::chain::cosmos::types::account::{Account, AccountSequence};
use crate::chain::cosmos::wait::wait_tx_included;
use crate::chain::cosmos::ChainClient;
use crate::chain::rpc::{BroadcastResponse, TxResult};
use crate::error::{Error, INCORRECT_ACCOUNT_SEQUENCE_ERR};
use crate::keyring::KeyEntry;

/// Result of a transaction that reached the node.
///
/// Failing to reach the node at all is an `Err` of [`ChainClient::send_messages`]
/// instead, so that "could not send" is never mistaken for "sent but rejected".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Included in a block and executed successfully.
    Confirmed {
        result: TxResult,
        gas_limit: u64,
    },

    /// Accepted by the node but rejected by the ledger, either by CheckTx or
    /// once executed in a block.
    Rejected(TxRejection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRejection {
    pub hash: TxHash,
    pub code: u32,
    pub log: String,

    /// Height of the block the transaction failed in, if it got that far.
    pub height: Option<u64>,
}

impl BroadcastOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn hash(&self) -> TxHash {
        match self {
            Self::Confirmed { result, .. } => result.hash,
            Self::Rejected(rejection) => rejection.hash,
        }
    }

    /// The result code reported by the node, zero exactly when confirmed.
    pub fn code(&self) -> u32 {
        match self {
            Self::Confirmed { result, .. } => result.code,
            Self::Rejected(rejection) => rejection.code,
        }
    }
}

impl ChainClient {
    /// Wraps `message` in a transaction, signs and broadcasts it.
    pub async fn send_message(&self, message: Any) -> Result<BroadcastOutcome, Error> {
        self.send_messages(vec![message]).await
    }

    /// Wraps `messages` in a single transaction, estimates its gas through a
    /// simulation, signs it with the configured key and broadcasts it, then
    /// waits for the transaction to be included in a block.
    ///
    /// Errors mean the transaction could not be built or sent. A transaction
    /// rejected by the ledger is reported as [`BroadcastOutcome::Rejected`].
    #[instrument(
        name = "send_messages",
        level = "error",
        skip_all,
        fields(chain = %self.chain_id(), messages = messages.len()),
    )]
    pub async fn send_messages(&self, messages: Vec<Any>) -> Result<BroadcastOutcome, Error> {
        let address = self.get_address()?;
        let key_entry = self.keybase.get_key(&self.config.key).map_err(Error::key_base)?;

        if self.debug {
            let type_urls = messages.iter().map(|m| m.type_url.as_str()).collect::<Vec<_>>();
            debug!(?type_urls, "sending messages");
        }

        let mut m_account = self.account.lock().await;

        let attempt = self
            .sign_and_broadcast(&key_entry, &address, &messages, &mut m_account)
            .await;

        // A stale cached sequence shows up either while simulating or in CheckTx.
        // Refresh the account and retry once.
        let (response, sequence, gas_limit) = match attempt {
            Err(e) if e.is_account_sequence_mismatch() => {
                warn!("failed to estimate gas with a stale account sequence, refreshing account and retrying: {e}");

                *m_account = None;
                self.sign_and_broadcast(&key_entry, &address, &messages, &mut m_account)
                    .await?
            }
            Ok((response, sequence, _)) if response.code == INCORRECT_ACCOUNT_SEQUENCE_ERR => {
                warn!(
                    tx_hash = %response.hash,
                    %sequence,
                    log = %response.log,
                    "transaction signed with a stale account sequence, refreshing account and retrying",
                );

                *m_account = None;
                self.sign_and_broadcast(&key_entry, &address, &messages, &mut m_account)
                    .await?
            }
            attempt => attempt?,
        };

        if response.code != 0 {
            error!(
                tx_hash = %response.hash,
                code = response.code,
                log = %response.log,
                %sequence,
                "transaction rejected by CheckTx",
            );

            if response.code == INCORRECT_ACCOUNT_SEQUENCE_ERR {
                *m_account = None;
            }

            return Ok(BroadcastOutcome::Rejected(TxRejection {
                hash: response.hash,
                code: response.code,
                log: response.log,
                height: None,
            }));
        }

        if let Some(cached) = m_account.as_mut() {
            cached.sequence.increment_mut();
        }
        drop(m_account);

        let result = wait_tx_included(self.rpc.as_ref(), self.timeout, &response.hash).await?;

        if result.code != 0 {
            error!(
                tx_hash = %result.hash,
                height = result.height,
                code = result.code,
                log = %result.log,
                gas_wanted = result.gas_wanted,
                gas_used = result.gas_used,
                "transaction failed to execute",
            );

            return Ok(BroadcastOutcome::Rejected(TxRejection {
                hash: result.hash,
                code: result.code,
                log: result.log,
                height: Some(result.height),
            }));
        }

        info!(
            tx_hash = %result.hash,
            height = result.height,
            gas_limit,
            gas_used = result.gas_used,
            "transaction confirmed",
        );

        Ok(BroadcastOutcome::Confirmed { result, gas_limit })
    }

    /// Estimates, signs and broadcasts one transaction with the cached
    /// account, fetching it first if needed. Returns the CheckTx response
    /// along with the sequence and gas limit the transaction was signed with.
    async fn sign_and_broadcast(
        &self,
        key_entry: &KeyEntry,
        address: &str,
        messages: &[Any],
        m_account: &mut Option<Account>,
    ) -> Result<(BroadcastResponse, AccountSequence, u64), Error> {
        let account =
            *get_or_fetch_account(self.rpc.as_ref(), &self.retry, address, m_account).await?;

        let estimate = estimate_gas(
            self.rpc.as_ref(),
            &self.retry,
            &account,
            messages,
            self.config.gas_adjustment,
        )
        .await?;

        let fee = gas_limit_to_fee(estimate.gas_limit, &self.gas_prices);

        let tx_bytes = sign_and_encode_tx(
            &self.config.chain_id,
            key_entry,
            &account,
            messages,
            &fee,
        )?;

        match self.rpc.broadcast_tx_sync(tx_bytes).await {
            Ok(response) => Ok((response, account.sequence, estimate.gas_limit)),
            Err(e) => {
                // The sequence may or may not have been consumed.
                *m_account = None;
                Err(e)
            }
        }
    }
}
