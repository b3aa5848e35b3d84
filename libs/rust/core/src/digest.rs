//! 32-byte digests and the bit-prefix math the mining game scores with.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::MineError;

pub const DIGEST_LEN: usize = 32;

/// Fixed 32-byte digest. All ordering and prefix logic operates on this type;
/// comparison is byte-lexicographic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MineError> {
        let arr: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| MineError::DigestLength(bytes.len()))?;
        Ok(Digest(arr))
    }

    /// SHA-256 of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Digest(Sha256::digest(data).into())
    }

    /// SHA-256 of `prefix ‖ data`, the shape every hash in the protocol takes.
    pub fn sha256_concat(prefix: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        hasher.update(data);
        Digest(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, MineError> {
        let bytes = hex::decode(s).map_err(|_| MineError::DigestLength(s.len() / 2))?;
        Digest::from_slice(&bytes)
    }
}

/// Number of identical leading bits between two digests, in `[0, 256]`.
/// Byte scan, then a leading-zero count on the XOR of the first differing byte.
pub fn common_prefix_bits(a: &Digest, b: &Digest) -> u32 {
    let mut bits = 0u32;
    for (x, y) in a.0.iter().zip(b.0.iter()) {
        if x == y {
            bits += 8;
        } else {
            bits += (x ^ y).leading_zeros();
            break;
        }
    }
    bits
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(de::Error::custom)
    }
}
