//! Content identifiers and peer identities.
//!
//! A CID is opaque to the mining game except for the 32-byte digest its
//! multihash decodes to: equality, ordering, and prefix scoring all operate
//! on that digest. The chain transports CIDs as hex digest strings.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::Digest;
use crate::error::MineError;

/// Content identifier, ordered by its decoded digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid(Digest);

impl Cid {
    /// Parse the chain's string form of a CID. Fails with `DigestLength`
    /// when the decoded digest is not 32 bytes.
    pub fn parse(s: &str) -> Result<Self, MineError> {
        Ok(Cid(Digest::from_hex(s)?))
    }

    /// Identifier of a raw block: the SHA-256 of its bytes.
    pub fn for_block(data: &[u8]) -> Self {
        Cid(Digest::sha256(data))
    }

    pub fn from_digest(digest: Digest) -> Self {
        Cid(digest)
    }

    pub fn digest(&self) -> &Digest {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Digest::deserialize(deserializer).map(Cid)
    }
}

/// Node identity: the chain-registered peer id string together with its
/// identity digest, the per-peer salt mixed into every Merkle leaf.
#[derive(Clone)]
pub struct PeerId {
    id: String,
    digest: Digest,
}

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let digest = Digest::sha256(id.as_bytes());
        PeerId { id, digest }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Cid::parse("deadbeef").is_err());
        let ok = Cid::parse(&"ab".repeat(32)).unwrap();
        assert_eq!(ok.digest().as_bytes()[0], 0xab);
    }

    #[test]
    fn display_round_trips() {
        let c = Cid::for_block(b"some block");
        let again = Cid::parse(&c.to_string()).unwrap();
        assert_eq!(c, again);
    }

    #[test]
    fn equal_iff_digests_equal() {
        let a = Cid::for_block(b"x");
        let b = Cid::from_digest(*a.digest());
        assert_eq!(a, b);
        assert_ne!(a, Cid::for_block(b"y"));
    }

    #[test]
    fn peer_digest_is_stable() {
        let p1 = PeerId::new("12D3KooWnode");
        let p2 = PeerId::new("12D3KooWnode");
        assert_eq!(p1.digest(), p2.digest());
    }
}
