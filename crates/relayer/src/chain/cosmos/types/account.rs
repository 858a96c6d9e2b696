use core::fmt;

use ibc_proto::cosmos::auth::v1beta1::BaseAccount;

/// Account number and sequence of the signing account, as last seen on chain
/// and advanced locally after every accepted broadcast.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub number: AccountNumber,
    pub sequence: AccountSequence,
}

impl Account {
    /// Both fields must be known before signing. Zero means the value was
    /// never fetched, so it is queried again.
    pub fn is_resolved(&self) -> bool {
        self.number.to_u64() != 0 && self.sequence.to_u64() != 0
    }
}

impl From<BaseAccount> for Account {
    fn from(value: BaseAccount) -> Self {
        Self {
            number: AccountNumber::new(value.account_number),
            sequence: AccountSequence::new(value.sequence),
        }
    }
}

/// Newtype for account numbers
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccountNumber(u64);

impl AccountNumber {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for account sequence numbers
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccountSequence(u64);

impl AccountSequence {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }

    pub fn increment(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn increment_mut(&mut self) {
        self.0 += 1
    }
}

impl fmt::Display for AccountSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
