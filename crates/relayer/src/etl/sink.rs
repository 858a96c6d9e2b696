use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tendermint::{Hash as TxHash, Time};

use crate::error::Error;
use crate::etl::message::{PacketMessage, TransferMessage};
use crate::types::identifier::ChainId;

/// One included transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TxRow {
    pub hash: TxHash,
    pub chain_id: ChainId,
    pub height: u64,
    pub time: Time,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferRow {
    pub tx_hash: TxHash,
    /// Position of the message within its transaction.
    pub msg_index: usize,
    pub transfer: TransferMessage,
}

/// A packet lifecycle message: receive, timeout or acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PacketRow {
    pub tx_hash: TxHash,
    pub msg_index: usize,
    pub packet: PacketMessage,
}

/// Destination of the rows extracted by the block scanner.
///
/// Rows for different heights arrive in no particular order, and re-scanning
/// a height inserts its rows again.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn insert_transaction(&self, row: &TxRow) -> Result<(), Error>;

    async fn insert_transfer_message(&self, row: &TransferRow) -> Result<(), Error>;

    async fn insert_recv_packet_message(&self, row: &PacketRow) -> Result<(), Error>;

    async fn insert_timeout_message(&self, row: &PacketRow) -> Result<(), Error>;

    async fn insert_ack_message(&self, row: &PacketRow) -> Result<(), Error>;

    /// Highest block height stored so far for `chain_id`, if any.
    async fn last_stored_height(&self, chain_id: &ChainId) -> Result<Option<u64>, Error>;
}

#[derive(Debug, Default)]
struct Rows {
    transactions: Vec<TxRow>,
    transfers: Vec<TransferRow>,
    recv_packets: Vec<PacketRow>,
    timeouts: Vec<PacketRow>,
    acks: Vec<PacketRow>,
    rejecting: bool,
}

/// A sink keeping every row in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Rows>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While set, every insert fails and nothing is stored.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rows().rejecting = rejecting;
    }

    pub fn transactions(&self) -> Vec<TxRow> {
        self.rows().transactions.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRow> {
        self.rows().transfers.clone()
    }

    pub fn recv_packets(&self) -> Vec<PacketRow> {
        self.rows().recv_packets.clone()
    }

    pub fn timeouts(&self) -> Vec<PacketRow> {
        self.rows().timeouts.clone()
    }

    pub fn acks(&self) -> Vec<PacketRow> {
        self.rows().acks.clone()
    }

    fn insert<T>(&self, row: &T, table: impl FnOnce(&mut Rows) -> &mut Vec<T>) -> Result<(), Error>
    where
        T: Clone,
    {
        let mut rows = self.rows();
        if rows.rejecting {
            return Err(Error::sink("insert rejected".to_string()));
        }

        table(&mut rows).push(row.clone());
        Ok(())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn insert_transaction(&self, row: &TxRow) -> Result<(), Error> {
        self.insert(row, |rows| &mut rows.transactions)
    }

    async fn insert_transfer_message(&self, row: &TransferRow) -> Result<(), Error> {
        self.insert(row, |rows| &mut rows.transfers)
    }

    async fn insert_recv_packet_message(&self, row: &PacketRow) -> Result<(), Error> {
        self.insert(row, |rows| &mut rows.recv_packets)
    }

    async fn insert_timeout_message(&self, row: &PacketRow) -> Result<(), Error> {
        self.insert(row, |rows| &mut rows.timeouts)
    }

    async fn insert_ack_message(&self, row: &PacketRow) -> Result<(), Error> {
        self.insert(row, |rows| &mut rows.acks)
    }

    async fn last_stored_height(&self, chain_id: &ChainId) -> Result<Option<u64>, Error> {
        Ok(self
            .rows()
            .transactions
            .iter()
            .filter(|row| &row.chain_id == chain_id)
            .map(|row| row.height)
            .max())
    }
}
