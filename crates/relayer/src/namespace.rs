//! Serialized access to the bech32 address namespace.
//!
//! Encoding and decoding addresses depends on a table of human-readable
//! prefixes (accounts, validator operators, consensus nodes) which differs from
//! one chain to the next. An [`AddressNamespace`] owns that table. Every
//! address-sensitive operation runs inside [`AddressNamespace::with_chain`],
//! which installs the prefixes of one chain for the duration of a closure
//! while holding an exclusive lock. Two chains sharing the same namespace
//! therefore never observe each other's prefixes, at the price of serializing
//! all address work across chains.
//!
//! Chain clients meant to coexist in one process must share a single
//! namespace, typically through an `Arc<AddressNamespace>`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bech32::{FromBase32, ToBase32, Variant};
use tracing::trace;

use crate::error::Error;

pub const VALIDATOR_SUFFIX: &str = "valoper";
pub const CONSENSUS_SUFFIX: &str = "valcons";
pub const PUBKEY_SUFFIX: &str = "pub";

/// The prefix table derived from one chain's account prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bech32Prefixes {
    pub account: String,
    pub account_pub: String,
    pub validator: String,
    pub validator_pub: String,
    pub consensus: String,
    pub consensus_pub: String,
}

impl Bech32Prefixes {
    pub fn from_account_prefix(prefix: &str) -> Self {
        let validator = format!("{prefix}{VALIDATOR_SUFFIX}");
        let consensus = format!("{prefix}{CONSENSUS_SUFFIX}");

        Self {
            account: prefix.to_string(),
            account_pub: format!("{prefix}{PUBKEY_SUFFIX}"),
            validator_pub: format!("{validator}{PUBKEY_SUFFIX}"),
            validator,
            consensus_pub: format!("{consensus}{PUBKEY_SUFFIX}"),
            consensus,
        }
    }
}

#[derive(Debug, Default)]
pub struct AddressNamespace {
    prefixes: Mutex<Bech32Prefixes>,
}

impl AddressNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the prefixes derived from `account_prefix` and runs `f` while
    /// holding the namespace exclusively. Nothing encoded or decoded through
    /// the context may escape the closure half-done.
    pub fn with_chain<R>(&self, account_prefix: &str, f: impl FnOnce(&CodecContext<'_>) -> R) -> R {
        // Poisoning is ignored: the table is rewritten on every acquisition.
        let mut guard = self.prefixes.lock().unwrap_or_else(PoisonError::into_inner);

        *guard = Bech32Prefixes::from_account_prefix(account_prefix);
        trace!(prefix = %account_prefix, "address namespace acquired");

        let context = CodecContext { prefixes: guard };
        f(&context)
    }
}

/// Address codec bound to the prefixes installed by [`AddressNamespace::with_chain`].
/// Only exists while the namespace lock is held.
pub struct CodecContext<'a> {
    prefixes: MutexGuard<'a, Bech32Prefixes>,
}

impl CodecContext<'_> {
    pub fn prefixes(&self) -> &Bech32Prefixes {
        &self.prefixes
    }

    pub fn account_prefix(&self) -> &str {
        &self.prefixes.account
    }

    pub fn validator_prefix(&self) -> &str {
        &self.prefixes.validator
    }

    pub fn consensus_prefix(&self) -> &str {
        &self.prefixes.consensus
    }

    pub fn encode_account(&self, address: &[u8]) -> Result<String, Error> {
        encode(&self.prefixes.account, address)
    }

    pub fn encode_validator(&self, address: &[u8]) -> Result<String, Error> {
        encode(&self.prefixes.validator, address)
    }

    pub fn encode_consensus(&self, address: &[u8]) -> Result<String, Error> {
        encode(&self.prefixes.consensus, address)
    }

    /// Decodes an account address, which must carry the installed account prefix.
    pub fn decode_account(&self, address: &str) -> Result<Vec<u8>, Error> {
        let (hrp, bytes) = decode(address)?;

        if hrp != self.prefixes.account {
            return Err(Error::address_prefix_mismatch(
                address.to_string(),
                self.prefixes.account.clone(),
            ));
        }

        Ok(bytes)
    }

    /// Re-encodes an address carrying any prefix under the installed account prefix.
    pub fn normalize_account(&self, address: &str) -> Result<String, Error> {
        let (_, bytes) = decode(address)?;
        self.encode_account(&bytes)
    }
}

fn encode(prefix: &str, address: &[u8]) -> Result<String, Error> {
    bech32::encode(prefix, address.to_base32(), Variant::Bech32).map_err(Error::bech32_encoding)
}

fn decode(address: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data, _) = bech32::decode(address).map_err(Error::bech32_encoding)?;
    let bytes = Vec::from_base32(&data).map_err(Error::bech32_encoding)?;
    Ok((hrp, bytes))
}
