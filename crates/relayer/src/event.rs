//! Events pushed by a node over its websocket subscriptions.

pub mod listener;
pub mod subscription;

use std::collections::BTreeMap;

use serde::Serialize;

pub use listener::{ListenOptions, Listener};
pub use subscription::{EventStream, Subscription, Unsubscribe};

pub mod queries {
    /// Every transaction included in a block.
    pub const TX: &str = "tm.event='Tx'";

    /// Every new block.
    pub const NEW_BLOCK: &str = "tm.event='NewBlock'";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RpcEvent {
    /// The subscription query which matched this event.
    pub query: String,

    /// Rendering of the full event payload.
    pub data: String,

    /// Flattened event attributes keyed by `{event type}.{attribute}`.
    pub events: BTreeMap<String, Vec<String>>,
}

impl RpcEvent {
    /// Serializes the event to a single JSON line, either the full event or
    /// only its attributes.
    pub fn to_json(&self, raw: bool) -> Result<String, serde_json::Error> {
        if raw {
            serde_json::to_string(self)
        } else {
            serde_json::to_string(&self.events)
        }
    }
}
