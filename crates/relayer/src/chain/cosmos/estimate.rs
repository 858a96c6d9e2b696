use ibc_proto::cosmos::tx::v1beta1::{SimulateRequest, SimulateResponse};
use ibc_proto::google::protobuf::Any;
use prost::Message;
use tracing::{debug, error};

use crate::chain::cosmos::encode::{encode_tx, simulation_tx};
use crate::chain::cosmos::gas::adjust_gas;
use crate::chain::cosmos::query::abci_query;
use crate::chain::cosmos::retry::retry_transient;
use crate::chain::cosmos::types::account::Account;
use crate::chain::rpc::RpcClient;
use crate::error::Error;
use crate::util::retry::RetryPolicy;

pub const SIMULATE_PATH: &str = "/cosmos.tx.v1beta1.Service/Simulate";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GasEstimate {
    /// Gas consumed by the simulation.
    pub gas_used: u64,

    /// Gas limit to sign with, after adjustment.
    pub gas_limit: u64,
}

/// Simulates `messages` signed by `account` and derives the gas limit to sign
/// the real transaction with.
pub async fn estimate_gas(
    rpc_client: &dyn RpcClient,
    retry: &RetryPolicy,
    account: &Account,
    messages: &[Any],
    gas_adjustment: f64,
) -> Result<GasEstimate, Error> {
    let gas_used = simulate_gas(rpc_client, retry, account, messages).await?;
    let gas_limit = adjust_gas(gas_used, gas_adjustment);

    debug!(gas_used, gas_limit, gas_adjustment, "estimated gas");

    Ok(GasEstimate {
        gas_used,
        gas_limit,
    })
}

async fn simulate_gas(
    rpc_client: &dyn RpcClient,
    retry: &RetryPolicy,
    account: &Account,
    messages: &[Any],
) -> Result<u64, Error> {
    let tx = simulation_tx(account, messages)?;

    #[allow(deprecated)]
    let request = SimulateRequest {
        tx: None,
        tx_bytes: encode_tx(&tx)?,
    };
    let data = request.encode_to_vec();

    let response = retry_transient(retry, "tx simulation", || {
        abci_query(
            rpc_client,
            SIMULATE_PATH.to_string(),
            data.clone(),
            None,
            false,
        )
    })
    .await
    .map_err(|e| {
        error!("failed to simulate tx: {e}");
        e
    })?;

    let response = SimulateResponse::decode(response.value.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("SimulateResponse"), e))?;

    response
        .gas_info
        .map(|gas_info| gas_info.gas_used)
        .ok_or_else(Error::tx_simulate_gas_estimate)
}
