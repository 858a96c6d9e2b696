use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Account address of a compressed secp256k1 public key: `RIPEMD-160(SHA-256(pk))`.
pub fn address_from_public_key(public_key: &[u8]) -> Vec<u8> {
    let pk_hash = Sha256::digest(public_key);
    Ripemd160::digest(pk_hash).to_vec()
}
