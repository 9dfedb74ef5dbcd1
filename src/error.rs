//! Error types for Meridian
//!
//! Every failure is local to the offending message or block: callers log the
//! error and drop the input. Nothing in this taxonomy is fatal to a running
//! node.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Signature mismatch, malformed key bytes, or malformed signature bytes.
    /// A canonical-encoding disagreement between signer and verifier surfaces
    /// here too, since it is indistinguishable from forgery.
    #[error("Invalid transaction signature")]
    InvalidSignature,
    #[error("Duplicate transaction {0}")]
    DuplicateTransaction(String),
    #[error("Insufficient balance: {sender} has {balance}, transaction needs {amount}")]
    InsufficientBalance {
        sender: String,
        balance: u64,
        amount: u64,
    },
    #[error("Block hash does not match block contents")]
    InvalidBlockHash,
    #[error("Invalid proof of work: hash does not meet the difficulty target")]
    InvalidProofOfWork,
    #[error("Merkle root does not match transaction payload")]
    InvalidMerkleRoot,
    #[error("Previous hash {0} does not resolve to a known block")]
    InvalidPrevHash(String),
    /// Not a fault: the mined candidate targets a tip that has since been
    /// replaced. The batch stays ready for re-assembly against the new tip.
    #[error("Mining target is stale")]
    StaleMiningTarget,
    #[error("Cryptographic error: {0}")]
    Crypto(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Encoding(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
