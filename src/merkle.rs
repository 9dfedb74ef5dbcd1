//! Merkle-tree commitment over an ordered leaf sequence
//!
//! The root is a pure function of the leaves in insertion order: pairs of
//! adjacent nodes are hashed together level by level, and an odd trailing
//! node is paired with itself rather than dropped. Order is semantically
//! significant; leaves are never sorted or deduplicated.

use crate::crypto::{sha256, Hash};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<Hash>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf. When `raw` is true, `data` is taken as an
    /// already-computed 32-byte digest; otherwise it is hashed first.
    /// Non-32-byte raw input is hashed regardless, so every leaf is a digest.
    pub fn add_leaf(&mut self, data: &[u8], raw: bool) {
        let leaf = if raw {
            match data.try_into() {
                Ok(hash) => hash,
                Err(_) => sha256(data),
            }
        } else {
            sha256(data)
        };
        self.leaves.push(leaf);
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The top-of-pyramid hash: `None` for zero leaves, the leaf itself for
    /// one, otherwise the pairwise reduction.
    pub fn root(&self) -> Option<Hash> {
        if self.leaves.is_empty() {
            return None;
        }

        let mut level = self.leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                next.push(hash_pair(&left, &right));
            }
            level = next;
        }
        Some(level[0])
    }
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Merkle root over an iterator of unhashed leaves, in iteration order.
pub fn merkle_root_of<'a, I>(leaves: I) -> Option<Hash>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut tree = MerkleTree::new();
    for leaf in leaves {
        tree.add_leaf(leaf, false);
    }
    tree.root()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_has_no_root() {
        assert_eq!(MerkleTree::new().root(), None);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let mut tree = MerkleTree::new();
        tree.add_leaf(b"a", false);
        assert_eq!(tree.root(), Some(sha256(b"a")));
    }

    #[test]
    fn test_two_leaves_pairwise_hash() {
        let mut tree = MerkleTree::new();
        tree.add_leaf(b"a", false);
        tree.add_leaf(b"b", false);
        let expected = hash_pair(&sha256(b"a"), &sha256(b"b"));
        assert_eq!(tree.root(), Some(expected));
    }

    #[test]
    fn test_odd_trailing_leaf_is_duplicated() {
        let mut tree = MerkleTree::new();
        tree.add_leaf(b"a", false);
        tree.add_leaf(b"b", false);
        tree.add_leaf(b"c", false);

        let ab = hash_pair(&sha256(b"a"), &sha256(b"b"));
        let cc = hash_pair(&sha256(b"c"), &sha256(b"c"));
        assert_eq!(tree.root(), Some(hash_pair(&ab, &cc)));
    }

    #[test]
    fn test_leaf_order_changes_root() {
        let forward = merkle_root_of([b"a".as_slice(), b"b".as_slice()]);
        let reversed = merkle_root_of([b"b".as_slice(), b"a".as_slice()]);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_root_is_pure_function_of_leaves() {
        let leaves: Vec<&[u8]> = vec![b"a", b"b", b"c", b"d", b"e"];
        let once = merkle_root_of(leaves.iter().copied());

        // Same leaves added one at a time yield the same root, regardless of
        // how insertion was batched.
        let mut tree = MerkleTree::new();
        for leaf in &leaves {
            tree.add_leaf(leaf, false);
            let _ = tree.root();
        }
        assert_eq!(tree.root(), once);
    }

    #[test]
    fn test_raw_leaf_is_not_rehashed() {
        let digest = sha256(b"a");
        let mut raw_tree = MerkleTree::new();
        raw_tree.add_leaf(&digest, true);

        let mut hashed_tree = MerkleTree::new();
        hashed_tree.add_leaf(b"a", false);

        assert_eq!(raw_tree.root(), hashed_tree.root());
    }
}
