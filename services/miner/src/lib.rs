//! Storage-mining service for a chainstor content-addressed node.
//!
//! Each round the chain publishes a storage challenge and a mining
//! challenge. This service proves the node still holds every registered
//! block: it hashes each block under the storage challenge, assembles the
//! hashes into a deterministic Merkle tree, commits the root on chain, and
//! when its leaf scores the longest bit-prefix match with the mining
//! challenge, reveals the leaf together with its inclusion proof.

pub mod artifacts;
pub mod chain;
pub mod challenge_tree;
pub mod config;
pub mod file_set;
pub mod server;
pub mod store;
pub mod tick;
