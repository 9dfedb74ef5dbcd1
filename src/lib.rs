//! Meridian - a minimal multi-node proof-of-work transfer ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`ledger`] - Chain management, block validation, fork resolution
//! - [`transaction`] - Transaction types and signature validation
//! - [`mempool`] - Admission, dedup and finalization of pending transfers
//!
//! ## Consensus & Mining
//! - [`miner`] - Cancellable proof-of-work nonce search
//! - [`merkle`] - Merkle-tree commitment over transaction batches
//!
//! ## Cryptography & Encoding
//! - [`crypto`] - Signatures and verification (secp256k1)
//! - [`codec`] - Canonical transaction encoding shared by signer and hasher
//!
//! ## Networking & Orchestration
//! - [`network`] - P2P transport and the peer directory
//! - [`gossip`] - Seen-identifier tracking against rebroadcast storms
//! - [`node`] - The event loop tying everything together
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`persistence`] - JSON block sink
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod ledger;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod merkle;
pub mod miner;

// ============================================================================
// Cryptography & Encoding
// ============================================================================
pub mod codec;
pub mod crypto;

// ============================================================================
// Networking & Orchestration
// ============================================================================
pub mod gossip;
pub mod network;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod persistence;
