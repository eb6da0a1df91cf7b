#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Consensus: block creation and validation rules.

pub mod pow;

use crate::core::types::{Block, ChainSettings, CodecError, Entry};
use thiserror::Error;

/// Consensus errors.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Canonical serialization failed while hashing.
    #[error("codec")]
    Codec,
}

impl From<CodecError> for ConsensusError {
    fn from(_: CodecError) -> Self {
        ConsensusError::Codec
    }
}

/// Pluggable consensus service.
///
/// `create_block` is a blocking call (the PoW variant grinds nonces); the
/// orchestrator runs it on a dedicated worker and cancels it through
/// `cancel_mining` when a competing chain mutation lands.
pub trait Consensus: Send + Sync {
    /// Build the block at height 0, deterministic in the settings.
    fn create_genesis(&self, settings: &ChainSettings) -> Result<Block, ConsensusError>;

    /// Mine the next block. Returns `None` if mining was cancelled.
    fn create_block(&self, index: u64, data: Vec<Entry>, previous_hash: String) -> Option<Block>;

    /// Re-derive the block hash and compare with the stored one.
    fn validate_block_hash(&self, block: &Block) -> bool;

    /// Full consensus-rule validation of a single block.
    fn validate_block_consensus(&self, block: &Block) -> bool;

    /// Cooperatively stop the in-flight `create_block`, if any.
    fn cancel_mining(&self);
}
