use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::error::Error;
use crate::event::{RpcEvent, Subscription};
use crate::types::identifier::ChainId;

/// Which events a listener emits, and in which form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ListenOptions {
    /// Emit transaction events.
    pub tx: bool,

    /// Emit new block events.
    pub block: bool,

    /// Emit the full event rather than its attributes only.
    pub raw: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            tx: true,
            block: true,
            raw: false,
        }
    }
}

/// Handle on a background task rendering the transaction and block events of
/// a chain as JSON lines.
///
/// Both subscriptions are released when the task exits, whether it was
/// stopped, the handle was dropped, or both streams ended.
#[derive(Debug)]
pub struct Listener {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn spawn(
        chain_id: ChainId,
        tx_events: Subscription,
        block_events: Subscription,
        options: ListenOptions,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(listen_loop(
            chain_id,
            tx_events,
            block_events,
            options,
            stop_rx,
            out_tx,
        ));

        let listener = Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        };

        (listener, out_rx)
    }

    /// Signals the loop to stop and waits until it has released its subscriptions.
    pub async fn stop(mut self) -> Result<(), Error> {
        let (stop, handle) = match (self.stop.take(), self.handle.take()) {
            (Some(stop), Some(handle)) => (stop, handle),
            _ => return Err(Error::listener_stopped()),
        };

        // The loop may already be gone if both streams ended.
        let _ = stop.send(());

        handle.await.map_err(Error::join)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[instrument(name = "listen", level = "error", skip_all, fields(chain = %chain_id))]
async fn listen_loop(
    chain_id: ChainId,
    mut tx_events: Subscription,
    mut block_events: Subscription,
    options: ListenOptions,
    mut stop: oneshot::Receiver<()>,
    out: mpsc::UnboundedSender<String>,
) {
    debug!(?options, "listening for events");

    loop {
        let (event, emit) = tokio::select! {
            biased;

            _ = &mut stop => {
                debug!("stop requested");
                break;
            }
            Some(event) = tx_events.next() => (event, options.tx),
            Some(event) = block_events.next() => (event, options.block),
            else => {
                debug!("event streams ended");
                break;
            }
        };

        if !emit {
            continue;
        }

        match event {
            Ok(event) => {
                if !emit_event(&event, options.raw, &out) {
                    debug!("output receiver dropped");
                    break;
                }
            }
            Err(e) => warn!("error on event stream: {e}"),
        }
    }

    tx_events.unsubscribe();
    block_events.unsubscribe();
}

/// Returns `false` once nobody reads the output anymore.
fn emit_event(event: &RpcEvent, raw: bool, out: &mpsc::UnboundedSender<String>) -> bool {
    match event.to_json(raw) {
        Ok(line) => out.send(line).is_ok(),
        Err(e) => {
            error!(query = %event.query, "failed to serialize event: {e}");
            true
        }
    }
}
