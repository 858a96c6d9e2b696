use core::future::Future;
use core::time::Duration;
use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{StreamExt, TryFutureExt};
use tendermint::block::Height as TmHeight;
use tendermint::Hash as TxHash;
use tendermint_rpc::event::Event as TmEvent;
use tendermint_rpc::query::Query;
use tendermint_rpc::{
    Client, Error as TendermintRpcError, HttpClient, Order, SubscriptionClient, Url,
    WebSocketClient, WebSocketClientUrl,
};
use tracing::{debug, warn};

use crate::chain::rpc::{
    AbciQueryResponse, BroadcastResponse, FetchedBlock, NodeStatus, RpcClient, TxResult,
    SUBSCRIPTION_TIMEOUT,
};
use crate::error::Error;
use crate::event::{RpcEvent, Subscription, Unsubscribe};

/// Error signatures with which nodes answer queries for heights they do not have.
const UNKNOWN_HEIGHT_SIGNATURES: [&str; 3] = [
    "wrong ID: no ID",
    "must be less than or equal to the current blockchain height",
    "could not find results for height",
];

/// A Tendermint node reached over JSON-RPC. Requests go over HTTP and are
/// bounded by a fixed timeout; every subscription gets its own websocket
/// connection, torn down when the subscription is cancelled.
#[derive(Clone, Debug)]
pub struct TendermintRpc {
    rpc_addr: Url,
    client: HttpClient,
    timeout: Duration,
}

impl TendermintRpc {
    pub fn new(rpc_addr: Url, timeout: Duration) -> Result<Self, Error> {
        let client =
            HttpClient::new(rpc_addr.clone()).map_err(|e| Error::rpc(rpc_addr.clone(), e))?;

        Ok(Self {
            rpc_addr,
            client,
            timeout,
        })
    }

    pub fn websocket_url(&self) -> String {
        websocket_url(&self.rpc_addr)
    }

    async fn request<T, Fut>(&self, height: Option<u64>, request: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, TendermintRpcError>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(self.classify(height, e)),
            Err(_) => Err(Error::rpc_timeout(self.rpc_addr.to_string(), self.timeout)),
        }
    }

    fn classify(&self, height: Option<u64>, e: TendermintRpcError) -> Error {
        match height {
            Some(height) if is_unknown_height(&e) => Error::unknown_height(height),
            _ => Error::rpc(self.rpc_addr.clone(), e),
        }
    }
}

fn is_unknown_height(e: &TendermintRpcError) -> bool {
    let message = format!("{} {:?}", e, e.detail());

    UNKNOWN_HEIGHT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// The websocket endpoint served next to the HTTP endpoint at `rpc_addr`.
pub fn websocket_url(rpc_addr: &Url) -> String {
    let addr = rpc_addr.to_string();

    let addr = if let Some(rest) = addr.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = addr.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        addr
    };

    format!("{}/websocket", addr.trim_end_matches('/'))
}

fn to_height(height: u64) -> Result<TmHeight, Error> {
    TmHeight::try_from(height).map_err(|_| Error::unknown_height(height))
}

fn rpc_event(event: TmEvent) -> RpcEvent {
    RpcEvent {
        query: event.query,
        data: format!("{:?}", event.data),
        events: event
            .events
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
    }
}

#[async_trait]
impl RpcClient for TendermintRpc {
    fn address(&self) -> String {
        self.rpc_addr.to_string()
    }

    async fn status(&self) -> Result<NodeStatus, Error> {
        let status = self.request(None, self.client.status()).await?;

        Ok(NodeStatus {
            latest_height: status.sync_info.latest_block_height.value(),
            latest_block_time: status.sync_info.latest_block_time,
            catching_up: status.sync_info.catching_up,
        })
    }

    async fn block(&self, height: u64) -> Result<FetchedBlock, Error> {
        let response = self
            .request(Some(height), self.client.block(to_height(height)?))
            .await?;

        let block = response.block;

        Ok(FetchedBlock {
            height: block.header.height.value(),
            time: block.header.time,
            txs: block.data,
        })
    }

    async fn abci_query(
        &self,
        path: String,
        data: Vec<u8>,
        height: Option<u64>,
        prove: bool,
    ) -> Result<AbciQueryResponse, Error> {
        let query_height = height.filter(|h| *h != 0).map(to_height).transpose()?;

        let response = self
            .request(
                height,
                self.client.abci_query(Some(path), data, query_height, prove),
            )
            .await?;

        Ok(AbciQueryResponse {
            code: response.code.value(),
            log: response.log,
            value: response.value,
            proof: response.proof,
            height: response.height.value(),
        })
    }

    async fn broadcast_tx_sync(&self, tx: Vec<u8>) -> Result<BroadcastResponse, Error> {
        let response = self
            .request(None, self.client.broadcast_tx_sync(tx))
            .await?;

        Ok(BroadcastResponse {
            code: response.code.value(),
            log: response.log,
            hash: response.hash,
        })
    }

    async fn tx_by_hash(&self, hash: TxHash) -> Result<Option<TxResult>, Error> {
        let response = self
            .request(
                None,
                self.client.tx_search(
                    Query::eq("tx.hash", hash.to_string()),
                    false,
                    1,
                    1,
                    Order::Ascending,
                ),
            )
            .await?;

        Ok(response.txs.into_iter().next().map(|tx| TxResult {
            hash: tx.hash,
            height: tx.height.value(),
            code: tx.tx_result.code.value(),
            log: tx.tx_result.log,
            gas_wanted: tx.tx_result.gas_wanted,
            gas_used: tx.tx_result.gas_used,
        }))
    }

    async fn subscribe(&self, query: &str) -> Result<Subscription, Error> {
        let parsed = query
            .parse::<Query>()
            .map_err(|e| Error::invalid_query(query.to_string(), e))?;

        let ws_addr = self.websocket_url();
        let ws_url = ws_addr
            .parse::<WebSocketClientUrl>()
            .map_err(|e| Error::websocket(ws_addr.clone(), e))?;

        let connect = WebSocketClient::builder(ws_url)
            .build()
            .map_err(|e| Error::websocket(ws_addr.clone(), e));

        let (client, driver) = tokio::time::timeout(SUBSCRIPTION_TIMEOUT, connect)
            .await
            .map_err(|_| Error::subscription_timeout(query.to_string(), SUBSCRIPTION_TIMEOUT))??;

        let driver_handle = tokio::spawn(async move {
            if let Err(e) = driver.run().await {
                warn!("websocket driver stopped with error: {e}");
            }
        });

        let subscribed = tokio::time::timeout(SUBSCRIPTION_TIMEOUT, client.subscribe(parsed)).await;

        let stream = match subscribed {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let _ = client.close();
                driver_handle.abort();
                return Err(Error::websocket(ws_addr, e));
            }
            Err(_) => {
                let _ = client.close();
                driver_handle.abort();
                return Err(Error::subscription_timeout(
                    query.to_string(),
                    SUBSCRIPTION_TIMEOUT,
                ));
            }
        };

        debug!(query, url = %ws_addr, "subscription established");

        let url = ws_addr.clone();
        let events = stream.map(move |item| {
            item.map(rpc_event)
                .map_err(|e| Error::websocket(url.clone(), e))
        });

        let unsubscribe = Unsubscribe::new(move || {
            if let Err(e) = client.close() {
                debug!("failed to close websocket client: {e}");
            }
            driver_handle.abort();
        });

        Ok(Subscription::new(
            query.to_string(),
            Box::pin(events),
            unsubscribe,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn websocket_url_from_rpc_addr() {
        let http: Url = "http://127.0.0.1:26657".parse().unwrap();
        assert_eq!(websocket_url(&http), "ws://127.0.0.1:26657/websocket");

        let https: Url = "https://rpc.cosmos.network:443/".parse().unwrap();
        assert_eq!(websocket_url(&https), "wss://rpc.cosmos.network/websocket");

        let custom: Url = "https://rpc.cosmos.network:8443".parse().unwrap();
        assert_eq!(
            websocket_url(&custom),
            "wss://rpc.cosmos.network:8443/websocket"
        );
    }

    #[test]
    fn unknown_height_classification() {
        let rpc = TendermintRpc::new(
            "http://127.0.0.1:26657".parse().unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();

        let e = TendermintRpcError::client_internal(
            "height 105 must be less than or equal to the current blockchain height 104"
                .to_string(),
        );
        assert!(rpc.classify(Some(105), e).is_unknown_height());

        let e = TendermintRpcError::client_internal("wrong ID: no ID".to_string());
        assert!(rpc.classify(Some(7), e).is_unknown_height());

        let e = TendermintRpcError::client_internal("connection refused".to_string());
        let classified = rpc.classify(Some(7), e);
        assert!(!classified.is_unknown_height());
        assert!(classified.is_transient());

        let e = TendermintRpcError::client_internal("wrong ID: no ID".to_string());
        assert!(!rpc.classify(None, e).is_unknown_height());
    }
}
