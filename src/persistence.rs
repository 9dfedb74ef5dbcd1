//! Block persistence sink
//!
//! Accepted blocks are handed to a [`BlockSink`] as one JSON object per
//! block, for audit and debugging. The core never reads them back; the sink
//! is strictly write-only.

use crate::error::{ChainError, Result};
use crate::ledger::chain::Block;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Abstraction over where accepted blocks are recorded.
pub trait BlockSink: Send + Sync {
    fn append(&self, block: &Block) -> Result<()>;
}

#[derive(serde::Serialize, serde::Deserialize)]
struct BlockRecord {
    timestamp: u64,
    difficulty: u32,
    nonce: u64,
    prev_hash: String,
    merkle_root: String,
    tx_payload: String,
    block_hash: String,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        BlockRecord {
            timestamp: block.timestamp,
            difficulty: block.difficulty,
            nonce: block.nonce,
            prev_hash: hex::encode(block.prev_hash),
            merkle_root: hex::encode(block.merkle_root),
            // The payload is canonical JSON, so it is valid UTF-8 for every
            // block that passed validation.
            tx_payload: String::from_utf8_lossy(&block.tx_payload).into_owned(),
            block_hash: hex::encode(block.hash),
        }
    }
}

/// Appends one JSON object per line to a file on disk.
pub struct JsonFileSink {
    file: Mutex<File>,
}

impl JsonFileSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(JsonFileSink {
            file: Mutex::new(file),
        })
    }
}

impl BlockSink for JsonFileSink {
    fn append(&self, block: &Block) -> Result<()> {
        let line = serde_json::to_string(&BlockRecord::from(block))?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| ChainError::Persistence("Sink mutex poisoned".to_string()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("sink mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockSink for MemorySink {
    fn append(&self, block: &Block) -> Result<()> {
        let line = serde_json::to_string(&BlockRecord::from(block))?;
        self.records
            .lock()
            .map_err(|_| ChainError::Persistence("Sink mutex poisoned".to_string()))?
            .push(line);
        Ok(())
    }
}
