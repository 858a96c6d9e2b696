use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

const PATH_SEPARATOR: char = '/';
const VALID_SPECIAL_CHARS: &str = "._+-#[]<>";

/// Checks that `id` respects the ICS 24 host identifier format and length bounds.
pub fn validate_identifier(id: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::empty());
    }

    if id.contains(PATH_SEPARATOR) {
        return Err(ValidationError::contain_separator(id.to_string()));
    }

    if id.len() < min || id.len() > max {
        return Err(ValidationError::invalid_length(
            id.to_string(),
            id.len(),
            min,
            max,
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || VALID_SPECIAL_CHARS.contains(c))
    {
        return Err(ValidationError::invalid_character(id.to_string()));
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The revision number encoded in the identifier, e.g. `4` for `cosmoshub-4`.
    /// Identifiers without a numeric `-{n}` suffix are at revision 0.
    pub fn version(&self) -> u64 {
        Self::chain_version(&self.0)
    }

    pub fn chain_version(chain_id: &str) -> u64 {
        let Some((name, rev)) = chain_id.rsplit_once('-') else {
            return 0;
        };

        if name.is_empty() || name.ends_with('-') || rev.starts_with('0') {
            return 0;
        }

        rev.parse().unwrap_or(0)
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = ValidationError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier(id, 1, 64)?;
        Ok(Self(id.to_string()))
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = ValidationError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier(id, 9, 64)?;
        Ok(Self(id.to_string()))
    }
}

impl TryFrom<String> for ClientId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = ValidationError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier(id, 10, 64)?;
        Ok(Self(id.to_string()))
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConnectionId> for String {
    fn from(value: ConnectionId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId(String);

impl PortId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ValidationError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier(id, 2, 128)?;
        Ok(Self(id.to_string()))
    }
}

impl TryFrom<String> for PortId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortId> for String {
    fn from(value: PortId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ValidationError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        validate_identifier(id, 8, 64)?;
        Ok(Self(id.to_string()))
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}
