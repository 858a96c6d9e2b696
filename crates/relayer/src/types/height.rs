use core::fmt::{Display, Error as FmtError, Formatter};
use core::str::FromStr;

use ibc_proto::ibc::core::client::v1::Height as RawHeight;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// An IBC height: the block height within a given revision of a chain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Height {
    pub revision_number: u64,
    pub revision_height: u64,
}

impl Height {
    pub const fn new(revision_number: u64, revision_height: u64) -> Self {
        Self {
            revision_number,
            revision_height,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.revision_height == 0
    }

    pub fn increment(self) -> Self {
        Self::new(self.revision_number, self.revision_height + 1)
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

impl FromStr for Height {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rev, height) = s
            .split_once('-')
            .ok_or_else(|| ValidationError::invalid_height(s.to_string()))?;

        let revision_number = rev
            .parse()
            .map_err(|_| ValidationError::invalid_height(s.to_string()))?;
        let revision_height = height
            .parse()
            .map_err(|_| ValidationError::invalid_height(s.to_string()))?;

        Ok(Self::new(revision_number, revision_height))
    }
}

impl From<RawHeight> for Height {
    fn from(raw: RawHeight) -> Self {
        Self::new(raw.revision_number, raw.revision_height)
    }
}

impl From<Height> for RawHeight {
    fn from(height: Height) -> Self {
        RawHeight {
            revision_number: height.revision_number,
            revision_height: height.revision_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn display_and_parse() {
        let height = Height::new(4, 1_200_345);
        assert_eq!(height.to_string(), "4-1200345");
        assert_eq!("4-1200345".parse::<Height>().ok(), Some(height));
        assert!("1200345".parse::<Height>().is_err());
    }

    #[test]
    fn ordering_is_revision_first() {
        assert!(Height::new(1, 10) < Height::new(2, 1));
        assert!(Height::new(2, 1) < Height::new(2, 2));
        assert_eq!(Height::new(2, 1).increment(), Height::new(2, 2));
    }
}
