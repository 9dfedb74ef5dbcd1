//! Canonical byte encoding of transactions
//!
//! One deterministic encoding is shared by the signer, the verifier, the
//! Merkle commitment and the block payload: compact JSON with field names in
//! lexicographic order. Two conformant nodes must produce byte-identical
//! output for the same logical transaction, otherwise a signature written on
//! one node fails to verify on another.
//!
//! Determinism rests on two properties of `serde_json`: struct fields are
//! emitted in declaration order (the shadow structs below declare them
//! lexicographically), and compact output carries no whitespace.

use crate::error::{ChainError, Result};
use crate::transaction::{SignedTransaction, Transaction};
use serde::{Deserialize, Serialize};

/// Canonical transaction shape. Field order is the wire contract: amount,
/// nonce, receiver, sender, timestamp. Do not reorder.
#[derive(Serialize)]
struct CanonicalTx<'a> {
    amount: u64,
    nonce: u64,
    receiver: &'a str,
    sender: &'a str,
    timestamp: u64,
}

impl<'a> From<&'a Transaction> for CanonicalTx<'a> {
    fn from(tx: &'a Transaction) -> Self {
        CanonicalTx {
            amount: tx.amount,
            nonce: tx.nonce,
            receiver: &tx.receiver,
            sender: &tx.sender,
            timestamp: tx.timestamp,
        }
    }
}

/// Canonical signed-transaction shape for block payloads. Signature and key
/// bytes travel hex-encoded so the payload stays printable JSON.
#[derive(Serialize, Deserialize)]
struct CanonicalSignedTx {
    public_key: String,
    signature: String,
    transaction: CanonicalTxOwned,
}

#[derive(Serialize, Deserialize)]
struct CanonicalTxOwned {
    amount: u64,
    nonce: u64,
    receiver: String,
    sender: String,
    timestamp: u64,
}

impl From<&SignedTransaction> for CanonicalSignedTx {
    fn from(signed: &SignedTransaction) -> Self {
        CanonicalSignedTx {
            public_key: hex::encode(&signed.public_key),
            signature: hex::encode(&signed.signature),
            transaction: CanonicalTxOwned {
                amount: signed.transaction.amount,
                nonce: signed.transaction.nonce,
                receiver: signed.transaction.receiver.clone(),
                sender: signed.transaction.sender.clone(),
                timestamp: signed.transaction.timestamp,
            },
        }
    }
}

impl TryFrom<CanonicalSignedTx> for SignedTransaction {
    type Error = ChainError;

    fn try_from(canonical: CanonicalSignedTx) -> Result<Self> {
        let signature = hex::decode(&canonical.signature)
            .map_err(|e| ChainError::Encoding(format!("Invalid signature hex: {}", e)))?;
        let public_key = hex::decode(&canonical.public_key)
            .map_err(|e| ChainError::Encoding(format!("Invalid public key hex: {}", e)))?;
        Ok(SignedTransaction {
            transaction: Transaction {
                sender: canonical.transaction.sender,
                receiver: canonical.transaction.receiver,
                amount: canonical.transaction.amount,
                nonce: canonical.transaction.nonce,
                timestamp: canonical.transaction.timestamp,
            },
            signature,
            public_key,
        })
    }
}

/// Canonical encoding of a single transaction: the byte string that is
/// signed, and that serves as a Merkle leaf.
pub fn encode_tx(tx: &Transaction) -> Vec<u8> {
    // Serialization of these shadow structs cannot fail.
    serde_json::to_vec(&CanonicalTx::from(tx)).expect("canonical transaction encoding")
}

/// Canonical encoding of an ordered signed-transaction batch: the block's
/// `tx_payload`. Batch order is preserved exactly.
pub fn encode_batch(batch: &[SignedTransaction]) -> Vec<u8> {
    let canonical: Vec<CanonicalSignedTx> = batch.iter().map(CanonicalSignedTx::from).collect();
    serde_json::to_vec(&canonical).expect("canonical batch encoding")
}

/// Decode a block's `tx_payload` back into its signed transactions,
/// preserving order.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<SignedTransaction>> {
    let canonical: Vec<CanonicalSignedTx> = serde_json::from_slice(payload)?;
    canonical.into_iter().map(SignedTransaction::try_from).collect()
}
