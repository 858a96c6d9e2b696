//! Storage and use of the signing keys of a chain client.

pub mod errors;
pub mod key_utils;

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use bip39::{Language, Mnemonic, MnemonicType, Seed};
use bitcoin::bip32::{DerivationPath, ExtendedPrivKey};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::identifier::ChainId;

pub use errors::Error;

pub const KEYSTORE_DEFAULT_FOLDER: &str = "keys";
pub const KEYSTORE_DISK_BACKEND: &str = "keyring-test";
pub const KEYSTORE_FILE_EXTENSION: &str = "json";

/// [Coin type][coin-type] associated with a key.
///
/// [coin-type]: https://github.com/bitcoin/bips/blob/master/bip-0044.mediawiki#Coin_type
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoinType(u32);

impl CoinType {
    /// Atom (Cosmos) coin type with number 118.
    pub const ATOM: CoinType = CoinType(118);

    pub fn new(coin_type: u32) -> Self {
        Self(coin_type)
    }

    pub fn num(&self) -> u32 {
        self.0
    }

    /// Standard derivation path of the first account, `m/44'/{coin}'/0'/0/0`.
    pub fn hd_path(&self) -> String {
        format!("m/44'/{}'/0'/0/0", self.0)
    }
}

impl Default for CoinType {
    fn default() -> Self {
        Self::ATOM
    }
}

/// A named secp256k1 key pair together with its raw account address.
///
/// The address is kept as bytes: rendering it in bech32 depends on the
/// chain's prefixes and is done through the address namespace.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,

    /// Compressed public key
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,

    #[serde(with = "hex")]
    private_key: Vec<u8>,

    #[serde(with = "hex")]
    pub address: Vec<u8>,

    #[serde(default)]
    pub coin_type: CoinType,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("name", &self.name)
            .field("public_key", &hex::encode(&self.public_key))
            .field("address", &hex::encode(&self.address))
            .field("coin_type", &self.coin_type)
            .finish_non_exhaustive()
    }
}

impl KeyEntry {
    pub fn from_mnemonic(
        name: &str,
        mnemonic_words: &str,
        coin_type: CoinType,
    ) -> Result<Self, Error> {
        let private_key = private_key_from_mnemonic(mnemonic_words, coin_type)?;
        let signing_key = SigningKey::from_slice(&private_key)
            .map_err(|e| Error::invalid_key(name.to_string(), e.to_string()))?;

        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();

        let address = key_utils::address_from_public_key(&public_key);

        Ok(Self {
            name: name.to_string(),
            public_key,
            private_key,
            address,
            coin_type,
        })
    }

    /// Signs `message` with ECDSA over its SHA-256 digest, returning the
    /// 64-byte compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let signing_key = SigningKey::from_slice(&self.private_key)
            .map_err(|e| Error::invalid_key(self.name.clone(), e.to_string()))?;

        let signature: Signature = signing_key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }
}

/// Generates a fresh 24-word mnemonic from 256 bits of entropy.
pub fn create_mnemonic() -> String {
    Mnemonic::new(MnemonicType::Words24, Language::English)
        .phrase()
        .to_string()
}

/// Decode the private key bytes at the standard derivation path from a mnemonic
fn private_key_from_mnemonic(mnemonic_words: &str, coin_type: CoinType) -> Result<Vec<u8>, Error> {
    let mnemonic = Mnemonic::from_phrase(mnemonic_words, Language::English)
        .map_err(|e| Error::invalid_mnemonic(e.to_string()))?;

    let seed = Seed::new(&mnemonic, "");

    let hd_path_format = coin_type.hd_path();
    let hd_path = DerivationPath::from_str(&hd_path_format)
        .map_err(|_| Error::invalid_hd_path(hd_path_format))?;

    let private_key = ExtendedPrivKey::new_master(Network::Bitcoin, seed.as_bytes())
        .and_then(|k| k.derive_priv(&Secp256k1::new(), &hd_path))
        .map_err(|e| Error::private_key(e.to_string()))?;

    Ok(private_key.private_key.secret_bytes().to_vec())
}

#[derive(Clone, Debug, Default)]
pub struct Memory {
    keys: BTreeMap<String, KeyEntry>,
}

#[derive(Clone, Debug)]
pub struct Test {
    store: PathBuf,
}

impl Test {
    /// Path of the file holding key `name`. Names that would resolve
    /// outside of the store directory are rejected.
    fn key_file(&self, name: &str) -> Result<PathBuf, Error> {
        let is_component = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);

        if !is_component {
            return Err(Error::invalid_key_name(name.to_string()));
        }

        let mut filename = self.store.join(name);
        filename.set_extension(KEYSTORE_FILE_EXTENSION);
        Ok(filename)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Store {
    Memory,
    Test,
}

#[derive(Clone, Debug)]
pub enum KeyRing {
    Memory(Memory),
    Test(Test),
}

impl KeyRing {
    /// Opens the key store of `chain_id`. The on-disk backend lives under
    /// `{home}/keys/{chain_id}/keyring-test` and is created if missing.
    pub fn new(store: Store, home: &Path, chain_id: &ChainId) -> Result<Self, Error> {
        match store {
            Store::Memory => Ok(Self::Memory(Memory::default())),

            Store::Test => {
                let folder = disk_store_path(home, chain_id);

                fs::create_dir_all(&folder)
                    .map_err(|e| Error::key_store(folder.display().to_string(), e))?;

                debug!(folder = %folder.display(), "opened on-disk key store");

                Ok(Self::Test(Test { store: folder }))
            }
        }
    }

    pub fn get_key(&self, name: &str) -> Result<KeyEntry, Error> {
        match self {
            KeyRing::Memory(m) => m
                .keys
                .get(name)
                .cloned()
                .ok_or_else(|| Error::key_not_found(name.to_string())),

            KeyRing::Test(d) => {
                let filename = d.key_file(name)?;

                if !filename.exists() {
                    return Err(Error::key_not_found(name.to_string()));
                }

                let path = filename.display().to_string();
                let file = File::open(&filename).map_err(|e| Error::key_store(path.clone(), e))?;

                serde_json::from_reader(file).map_err(|e| Error::key_file(path, e))
            }
        }
    }

    pub fn key_exists(&self, name: &str) -> bool {
        match self {
            KeyRing::Memory(m) => m.keys.contains_key(name),
            KeyRing::Test(d) => d.key_file(name).map_or(false, |f| f.exists()),
        }
    }

    pub fn add_key(&mut self, key_entry: KeyEntry) -> Result<(), Error> {
        if self.key_exists(&key_entry.name) {
            return Err(Error::existing_key(key_entry.name));
        }

        match self {
            KeyRing::Memory(m) => {
                m.keys.insert(key_entry.name.clone(), key_entry);
            }

            KeyRing::Test(d) => {
                let filename = d.key_file(&key_entry.name)?;
                let path = filename.display().to_string();

                let file = File::create(&filename).map_err(|e| Error::key_store(path.clone(), e))?;

                serde_json::to_writer_pretty(file, &key_entry)
                    .map_err(|e| Error::key_file(path, e))?;
            }
        }

        Ok(())
    }

    /// Derives a key from `mnemonic` and stores it under `name`.
    pub fn add_key_from_mnemonic(
        &mut self,
        name: &str,
        mnemonic: &str,
        coin_type: CoinType,
    ) -> Result<KeyEntry, Error> {
        let key_entry = KeyEntry::from_mnemonic(name, mnemonic, coin_type)?;
        self.add_key(key_entry.clone())?;
        Ok(key_entry)
    }

    /// All stored keys, ordered by name.
    pub fn keys(&self) -> Result<Vec<KeyEntry>, Error> {
        match self {
            KeyRing::Memory(m) => Ok(m.keys.values().cloned().collect()),

            KeyRing::Test(d) => {
                let entries = fs::read_dir(&d.store)
                    .map_err(|e| Error::key_store(d.store.display().to_string(), e))?;

                let mut names = Vec::new();
                for entry in entries {
                    let path = entry
                        .map_err(|e| Error::key_store(d.store.display().to_string(), e))?
                        .path();

                    let is_key_file = path
                        .extension()
                        .map_or(false, |ext| ext == KEYSTORE_FILE_EXTENSION);

                    if let (true, Some(stem)) = (is_key_file, path.file_stem()) {
                        names.push(stem.to_string_lossy().into_owned());
                    }
                }

                names.sort();
                names.iter().map(|name| self.get_key(name)).collect()
            }
        }
    }

    pub fn sign(&self, name: &str, message: &[u8]) -> Result<Vec<u8>, Error> {
        self.get_key(name)?.sign(message)
    }
}

fn disk_store_path(home: &Path, chain_id: &ChainId) -> PathBuf {
    home.join(KEYSTORE_DEFAULT_FOLDER)
        .join(chain_id.as_str())
        .join(KEYSTORE_DISK_BACKEND)
}
