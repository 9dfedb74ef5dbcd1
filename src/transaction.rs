//! Transaction types and validation for Meridian

use crate::codec;
use crate::crypto::{self, Hash, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bare address string. Meridian deliberately has no identity layer: an
/// address is whatever string a client chooses to be paid under.
pub type Address = String;

/// Content-derived transaction identifier, used as the sole dedup and
/// reference key everywhere.
pub type TxId = Hash;

/// A transfer of `amount` units from `sender` to `receiver`. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub nonce: u64,
    pub timestamp: u64,
}

impl Transaction {
    /// Create a transaction stamped with the current unix time.
    pub fn new(sender: Address, receiver: Address, amount: u64, nonce: u64) -> Self {
        Transaction {
            sender,
            receiver,
            amount,
            nonce,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    /// Create a transaction with an explicit timestamp.
    pub fn with_timestamp(
        sender: Address,
        receiver: Address,
        amount: u64,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        Transaction {
            sender,
            receiver,
            amount,
            nonce,
            timestamp,
        }
    }

    /// Deterministic identifier: SHA-256 over a length-prefixed encoding of
    /// (sender, receiver, amount, nonce, timestamp). The length prefixes keep
    /// adjacent string fields from being ambiguous.
    pub fn id(&self) -> TxId {
        let mut hasher = Sha256::new();
        hasher.update((self.sender.len() as u64).to_le_bytes());
        hasher.update(self.sender.as_bytes());
        hasher.update((self.receiver.len() as u64).to_le_bytes());
        hasher.update(self.receiver.as_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id())
    }
}

/// A transaction plus the signature covering its canonical encoding and the
/// public key to check it against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
}

impl SignedTransaction {
    /// Sign the canonical encoding of `transaction` with `keypair`.
    pub fn sign(transaction: Transaction, keypair: &KeyPair) -> Result<Self, ChainError> {
        let message = codec::encode_tx(&transaction);
        let signature = keypair.sign(&message)?;
        Ok(SignedTransaction {
            transaction,
            signature: signature.to_vec(),
            public_key: keypair.public_key_bytes().to_vec(),
        })
    }

    /// Recompute the canonical encoding and verify the signature against it.
    /// Every failure mode of the primitive collapses into
    /// [`ChainError::InvalidSignature`].
    pub fn verify(&self) -> Result<(), ChainError> {
        let message = codec::encode_tx(&self.transaction);
        crypto::verify_signature(&self.public_key, &message, &self.signature)
    }

    pub fn id(&self) -> TxId {
        self.transaction.id()
    }
}
