use core::time::Duration;

use tendermint::Hash as TxHash;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::chain::rpc::{RpcClient, TxResult};
use crate::error::Error;

pub const WAIT_BACKOFF: Duration = Duration::from_millis(300);

/// Polls the node until the transaction with `tx_hash` is included in a
/// block, or fails with `TxNoConfirmation` once `timeout` has elapsed.
///
/// Transient query failures are polled through until the timeout. Any other
/// failure is reported as `TxConfirmation`, which keeps the hash of the
/// already accepted transaction.
pub async fn wait_tx_included(
    rpc_client: &dyn RpcClient,
    timeout: Duration,
    tx_hash: &TxHash,
) -> Result<TxResult, Error> {
    let start_time = Instant::now();

    loop {
        match rpc_client.tx_by_hash(*tx_hash).await {
            Ok(Some(result)) => {
                debug!(
                    tx_hash = %tx_hash,
                    height = result.height,
                    elapsed = ?start_time.elapsed(),
                    "transaction included",
                );

                return Ok(result);
            }
            Ok(None) => trace!(tx_hash = %tx_hash, "transaction not yet included"),
            Err(e) if e.is_transient() => {
                warn!(tx_hash = %tx_hash, "failed to query transaction, polling again: {e}");
            }
            Err(e) => return Err(Error::tx_confirmation(*tx_hash, e.to_string())),
        }

        if start_time.elapsed() > timeout {
            return Err(Error::tx_no_confirmation(*tx_hash, timeout));
        }

        sleep(WAIT_BACKOFF).await;
    }
}
