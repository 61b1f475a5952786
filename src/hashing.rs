//! Hash primitives used by the codec, sighash engine and interpreter

use crate::types::Hash;
use bitcoin_hashes::{sha1, sha256d, Hash as _};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA256(SHA256(x))
pub fn double_sha256(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    sha1::Hash::hash(data).into_inner()
}

/// Double-SHA256 digest wrapper whose `Display` is the byte-reversed hex
/// form used for transaction ids.
pub fn display_hash(hash: &Hash) -> sha256d::Hash {
    sha256d::Hash::from_inner(*hash)
}

/// Number of compression-function iterations a single-pass hash of
/// `message_len` bytes performs.
pub fn digest_iterations(message_len: usize) -> u64 {
    1 + ((message_len as u64 + 8) / 64)
}
