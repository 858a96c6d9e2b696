//! The node RPC boundary consumed by the chain client.
//!
//! Only the call contracts the client relies on are described here. The
//! production implementation speaks Tendermint JSON-RPC over HTTP and
//! websocket, see [`node::TendermintRpc`].

pub mod node;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tendermint::merkle::proof::ProofOps;
use tendermint::Hash as TxHash;
use tendermint::Time;

use crate::error::Error;
use crate::event::Subscription;

/// How long establishing a push subscription may take.
pub const SUBSCRIPTION_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub latest_height: u64,
    pub latest_block_time: Time,
    pub catching_up: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedBlock {
    pub height: u64,
    pub time: Time,
    /// Raw transactions, in block order.
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbciQueryResponse {
    pub code: u32,
    pub log: String,
    pub value: Vec<u8>,
    pub proof: Option<ProofOps>,
    /// Height of the state the query was answered from.
    pub height: u64,
}

/// Outcome of CheckTx for a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub code: u32,
    pub log: String,
    pub hash: TxHash,
}

/// Outcome of DeliverTx for an included transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResult {
    pub hash: TxHash,
    pub height: u64,
    pub code: u32,
    pub log: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
}

#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Address of the node, for diagnostics.
    fn address(&self) -> String;

    async fn status(&self) -> Result<NodeStatus, Error>;

    /// Fetches the block at `height`. Heights the node does not know fail with
    /// an error for which [`Error::is_unknown_height`] holds.
    async fn block(&self, height: u64) -> Result<FetchedBlock, Error>;

    /// Generic ABCI query, at the latest height when `height` is `None`.
    async fn abci_query(
        &self,
        path: String,
        data: Vec<u8>,
        height: Option<u64>,
        prove: bool,
    ) -> Result<AbciQueryResponse, Error>;

    /// Submits a transaction and waits for CheckTx only.
    async fn broadcast_tx_sync(&self, tx: Vec<u8>) -> Result<BroadcastResponse, Error>;

    /// Looks up an included transaction, `None` while it is not in a block.
    async fn tx_by_hash(&self, hash: TxHash) -> Result<Option<TxResult>, Error>;

    /// Opens a push subscription for events matching `query`.
    async fn subscribe(&self, query: &str) -> Result<Subscription, Error>;
}

/// The hash a node assigns to a raw transaction.
pub fn tx_hash(tx: &[u8]) -> TxHash {
    TxHash::Sha256(Sha256::digest(tx).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn tx_hash_is_sha256() {
        let hash = tx_hash(b"");
        assert_eq!(
            hash.to_string(),
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        );
    }
}
