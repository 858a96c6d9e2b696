//! Bulk extraction of IBC activity from historical blocks.
//!
//! The [`BlockScanner`] walks a range of heights, decodes every transaction
//! it finds and hands one row per transaction, and one row per recognized
//! IBC message, to a [`Sink`].

pub mod message;
pub mod scanner;
pub mod sink;

pub use message::{DecodedMessage, PacketMessage, TransferMessage};
pub use scanner::{make_height_range, start_height, BlockScanner, ScanOptions, ScanReport};
pub use sink::{MemorySink, PacketRow, Sink, TransferRow, TxRow};
