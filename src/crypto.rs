//! Cryptographic primitives for Meridian
//!
//! ECDSA over secp256k1 with SHA-256 message digests. Signatures are compact
//! (64 bytes), public keys compressed (33 bytes). Transaction verification
//! deliberately collapses every primitive failure into
//! [`ChainError::InvalidSignature`]: a malformed key or malformed signature
//! bytes are treated exactly like a mismatch, so a peer cannot probe which
//! part of a forgery was detected.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized secp256k1 context.
/// Prevents repeated, unnecessary context creation.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// 32-byte SHA-256 digest, used for block hashes, Merkle nodes and
/// transaction identifiers alike.
pub type Hash = [u8; 32];

/// SHA-256 of an arbitrary byte string.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    /// Creates a KeyPair from a hex-encoded secret key.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::Crypto(format!("Invalid hex secret key: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a message (hashed with SHA-256 first) and returns the compact
    /// signature bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and
/// signature bytes.
///
/// Any failure (bad key bytes, bad signature bytes, verification mismatch)
/// returns [`ChainError::InvalidSignature`]; the caller cannot and must not
/// distinguish between them.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    let public_key =
        PublicKey::from_slice(public_key_bytes).map_err(|_| ChainError::InvalidSignature)?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest).map_err(|_| ChainError::InvalidSignature)?;

    let signature =
        Signature::from_compact(signature_bytes).map_err(|_| ChainError::InvalidSignature)?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::InvalidSignature)
}
