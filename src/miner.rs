//! Proof-of-work mining
//!
//! The nonce search is the only long-running CPU-bound operation in the
//! node, so it runs on a blocking task and polls a cancellation token at a
//! fixed attempt interval. Cancellation is best-effort: a result that races
//! past it is caught later by the ledger's prev-hash check.

use crate::codec;
use crate::crypto::Hash;
use crate::ledger::chain::Block;
use crate::ledger::validation;
use crate::transaction::SignedTransaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Attempts between cancellation polls. Small enough that a fresh tip aborts
/// the search promptly, large enough that the atomic load stays off the hot
/// path.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Attempts between hash-rate progress lines.
const PROGRESS_LOG_INTERVAL: u64 = 1 << 20;

/// Shared flag that aborts an in-flight nonce search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of a nonce search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(Block),
    Cancelled,
}

/// Build an unsealed block candidate from a transaction batch: payload and
/// Merkle root committed, nonce and hash still zero.
pub fn assemble(
    batch: &[SignedTransaction],
    prev_hash: Hash,
    difficulty: u32,
    timestamp: u64,
) -> Block {
    Block {
        timestamp,
        difficulty,
        nonce: 0,
        prev_hash,
        merkle_root: validation::expected_merkle_root(batch),
        tx_payload: codec::encode_batch(batch),
        hash: [0u8; 32],
    }
}

/// Search for a nonce whose block hash meets the difficulty target.
///
/// Difficulty controls the expected number of attempts, not a bound; the
/// only guarantees are that a returned block satisfies the target and that
/// the token is polled every [`CANCEL_CHECK_INTERVAL`] attempts.
pub fn search(mut block: Block, cancel: &CancelToken) -> MineOutcome {
    let mut attempts: u64 = 0;
    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            debug!(attempts, "mining search cancelled");
            return MineOutcome::Cancelled;
        }
        if attempts > 0 && attempts % PROGRESS_LOG_INTERVAL == 0 {
            debug!(attempts, nonce = block.nonce, "mining in progress");
        }

        let hash = block.compute_hash();
        if validation::meets_difficulty(&hash, block.difficulty) {
            block.hash = hash;
            return MineOutcome::Mined(block);
        }

        block.nonce = block.nonce.wrapping_add(1);
        attempts += 1;
    }
}

/// Uncancellable search, used for the deterministic genesis block and in
/// tests.
pub fn mine(block: Block) -> Block {
    match search(block, &CancelToken::new()) {
        MineOutcome::Mined(mined) => mined,
        MineOutcome::Cancelled => unreachable!("fresh token is never cancelled"),
    }
}
