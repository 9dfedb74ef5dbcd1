use crate::crypto::Hash;
use crate::error::ChainError;
use crate::ledger::validation;
use crate::miner;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Fixed genesis timestamp (2024-01-01T00:00:00Z). Together with the empty
/// payload and a nonce search starting at zero this makes the genesis block
/// identical on every node without any coordination.
pub const GENESIS_TIMESTAMP: u64 = 1_704_067_200;

/// A mined block. Immutable once `hash` is fixed; the ledger only ever
/// appends blocks or replaces whole chain suffixes, never edits one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub timestamp: u64,
    pub difficulty: u32,
    pub nonce: u64,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    /// Canonical encoding of the included signed-transaction batch.
    #[serde(with = "serde_bytes")]
    pub tx_payload: Vec<u8>,
    pub hash: Hash,
}

impl Block {
    /// Hash over the six content fields, in fixed order. Pure and
    /// deterministic; `hash` itself is never an input.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.prev_hash);
        hasher.update(self.merkle_root);
        hasher.update(&self.tx_payload);
        hasher.finalize().into()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Whether the sealed hash meets this block's declared difficulty.
    pub fn meets_own_difficulty(&self) -> bool {
        validation::meets_difficulty(&self.hash, self.difficulty)
    }
}

/// How an incoming block changed the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The block extended the current tip.
    Extended,
    /// A side branch won fork resolution; the chain suffix above
    /// `fork_height` was replaced and balances must be replayed.
    Reorganized { fork_height: usize },
    /// Valid, but stored on a losing side branch (or already known).
    Shelved,
}

/// The ordered chain of blocks rooted at a deterministic genesis, plus an
/// index of every validated block ever seen so side branches can be
/// reconstructed during fork resolution.
pub struct Ledger {
    blocks: Vec<Block>,
    index: HashMap<Hash, Block>,
    difficulty: u32,
}

impl Ledger {
    /// Create a ledger containing only the mined genesis block.
    pub fn new(difficulty: u32) -> Self {
        let genesis = genesis_block(difficulty);
        let mut index = HashMap::new();
        index.insert(genesis.hash, genesis.clone());
        Ledger {
            blocks: vec![genesis],
            index,
            difficulty,
        }
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always contains genesis")
    }

    /// Total chain length, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn chain(&self) -> &[Block] {
        &self.blocks
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    /// Validate a block against this ledger, in fixed order and
    /// short-circuiting on the first failure: recomputed hash, proof of
    /// work, known parent, Merkle root, then every payload signature.
    /// Never mutates.
    pub fn validate(&self, block: &Block) -> Result<(), ChainError> {
        if block.compute_hash() != block.hash {
            return Err(ChainError::InvalidBlockHash);
        }
        if !validation::meets_difficulty(&block.hash, self.difficulty) {
            return Err(ChainError::InvalidProofOfWork);
        }
        if !self.index.contains_key(&block.prev_hash) {
            return Err(ChainError::InvalidPrevHash(hex::encode(block.prev_hash)));
        }
        let batch = crate::codec::decode_batch(&block.tx_payload)?;
        if validation::expected_merkle_root(&batch) != block.merkle_root {
            return Err(ChainError::InvalidMerkleRoot);
        }
        validation::verify_batch_signatures(&batch)?;
        Ok(())
    }

    /// Validate and incorporate a block: extend the tip directly, or run
    /// fork resolution against the branch the block completes. Adoption of a
    /// competing branch replaces the whole chain suffix above the fork
    /// point; the caller replays balances and purges its mempool from the
    /// returned outcome.
    pub fn apply(&mut self, block: Block) -> Result<ApplyOutcome, ChainError> {
        if self.index.contains_key(&block.hash) {
            debug!(hash = %block.hash_hex(), "block already known");
            return Ok(ApplyOutcome::Shelved);
        }

        self.validate(&block)?;

        let extends_tip = block.prev_hash == self.tip().hash;
        self.index.insert(block.hash, block.clone());

        if extends_tip {
            self.blocks.push(block);
            return Ok(ApplyOutcome::Extended);
        }

        // The block completes a side branch: reconstruct that branch and let
        // the fork-choice rule decide. Longer chains win; on equal length,
        // the strictly earlier tip timestamp wins, so every node picks the
        // same branch from the same inputs.
        let candidate = self.branch_ending_at(&block)?;
        let adopt = candidate.len() > self.blocks.len()
            || (candidate.len() == self.blocks.len()
                && block.timestamp < self.tip().timestamp);

        if !adopt {
            debug!(
                hash = %block.hash_hex(),
                branch_len = candidate.len(),
                chain_len = self.blocks.len(),
                "side branch shelved"
            );
            return Ok(ApplyOutcome::Shelved);
        }

        let fork_height = self
            .blocks
            .iter()
            .zip(candidate.iter())
            .take_while(|(a, b)| a.hash == b.hash)
            .count();
        self.blocks = candidate;
        Ok(ApplyOutcome::Reorganized { fork_height })
    }

    /// Reconstruct the full chain whose tip is `block` by walking parent
    /// links through the index back to genesis.
    fn branch_ending_at(&self, block: &Block) -> Result<Vec<Block>, ChainError> {
        let genesis_hash = self.genesis().hash;
        let mut branch = vec![block.clone()];
        let mut cursor = block.prev_hash;
        while cursor != genesis_hash {
            let parent = self
                .index
                .get(&cursor)
                .ok_or_else(|| ChainError::InvalidPrevHash(hex::encode(cursor)))?;
            branch.push(parent.clone());
            cursor = parent.prev_hash;
        }
        branch.push(self.genesis().clone());
        branch.reverse();
        Ok(branch)
    }
}

/// The deterministic genesis block: fixed timestamp, zero parent, empty
/// payload, mined at the configured difficulty.
pub fn genesis_block(difficulty: u32) -> Block {
    let candidate = miner::assemble(&[], [0u8; 32], difficulty, GENESIS_TIMESTAMP);
    miner::mine(candidate)
}
