use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::identifier::{ChannelId, ClientId, ConnectionId, PortId};

/// The local end of a relaying path: the light client tracking the
/// counterparty, and once they exist, the connection built on top of it and
/// the channel built on the connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEnd {
    pub client_id: ClientId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelEnd>,
}

/// Channel parameters of a path end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnd {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub order: Order,
    pub version: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Unordered,
    Ordered,
}

impl Display for Order {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Unordered => write!(f, "unordered"),
            Self::Ordered => write!(f, "ordered"),
        }
    }
}

impl FromStr for Order {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unordered" => Ok(Self::Unordered),
            "ordered" => Ok(Self::Ordered),
            _ => Err(ValidationError::invalid_order(s.to_string())),
        }
    }
}

impl PathEnd {
    pub fn new(client_id: ClientId, connection_id: ConnectionId) -> Self {
        Self {
            client_id,
            connection_id: Some(connection_id),
            channel: None,
        }
    }

    /// A path end whose connection does not exist yet.
    pub fn for_client(client_id: ClientId) -> Self {
        Self {
            client_id,
            connection_id: None,
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelEnd) -> Self {
        self.channel = Some(channel);
        self
    }

    /// ICS 24 store key of the client state.
    pub fn client_state_path(&self) -> String {
        format!("clients/{}/clientState", self.client_id)
    }

    /// ICS 24 store key of the consensus state stored by the client at `height`.
    pub fn consensus_state_path(&self, revision_number: u64, revision_height: u64) -> String {
        format!(
            "clients/{}/consensusStates/{}-{}",
            self.client_id, revision_number, revision_height
        )
    }

    /// ICS 24 store key of the connection end, if there is a connection.
    pub fn connection_path(&self) -> Option<String> {
        self.connection_id
            .as_ref()
            .map(|connection_id| format!("connections/{connection_id}"))
    }
}
