//! Block-level validation helpers shared by the ledger and the miner

use crate::codec;
use crate::crypto::Hash;
use crate::error::ChainError;
use crate::merkle;
use crate::transaction::SignedTransaction;

/// Count the leading zero hex digits (nibbles) of a hash.
pub fn leading_zero_nibbles(hash: &Hash) -> u32 {
    let mut count = 0;
    for byte in hash {
        if byte >> 4 != 0 {
            break;
        }
        count += 1;
        if byte & 0x0F != 0 {
            break;
        }
        count += 1;
    }
    count
}

/// Whether `hash` has at least `difficulty` leading zero nibbles.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

/// Merkle root over the canonical encodings of the batch's transactions, in
/// batch order. An empty batch commits to the all-zero root.
pub fn expected_merkle_root(batch: &[SignedTransaction]) -> Hash {
    let leaves: Vec<Vec<u8>> = batch
        .iter()
        .map(|signed| codec::encode_tx(&signed.transaction))
        .collect();
    merkle::merkle_root_of(leaves.iter().map(|l| l.as_slice())).unwrap_or([0u8; 32])
}

/// Verify every signature in a decoded payload, short-circuiting on the
/// first failure.
pub fn verify_batch_signatures(batch: &[SignedTransaction]) -> Result<(), ChainError> {
    for signed in batch {
        signed.verify()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_nibbles() {
        assert_eq!(leading_zero_nibbles(&[0u8; 32]), 64);

        let mut hash = [0xFFu8; 32];
        assert_eq!(leading_zero_nibbles(&hash), 0);

        hash[0] = 0x0F; // one zero nibble
        assert_eq!(leading_zero_nibbles(&hash), 1);

        hash[0] = 0x00;
        hash[1] = 0x0F; // three zero nibbles
        assert_eq!(leading_zero_nibbles(&hash), 3);

        hash[1] = 0xF0; // two zero nibbles
        assert_eq!(leading_zero_nibbles(&hash), 2);
    }

    #[test]
    fn test_meets_difficulty_boundary() {
        let mut hash = [0xFFu8; 32];
        hash[0] = 0x00;
        hash[1] = 0x0F;
        assert!(meets_difficulty(&hash, 3));
        assert!(!meets_difficulty(&hash, 4));
        assert!(meets_difficulty(&hash, 0));
    }

    #[test]
    fn test_empty_batch_commits_to_zero_root() {
        assert_eq!(expected_merkle_root(&[]), [0u8; 32]);
    }
}
