//! Domain types shared by the chain client, the proof aggregator and the block scanner.

pub mod error;
pub mod height;
pub mod identifier;
pub mod path;

pub use height::Height;
pub use identifier::{ChainId, ChannelId, ClientId, ConnectionId, PortId};
pub use path::{ChannelEnd, Order, PathEnd};
