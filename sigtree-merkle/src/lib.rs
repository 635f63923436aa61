use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sigtree_hash::h_sorted_pair;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// Empty leaf set, empty message, or heterogeneous message lengths.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Proof requested for a message absent from level 0.
    #[error("message not found in tree")]
    NotFound,
    /// Root requested from a tree with no completed level structure.
    #[error("tree is empty")]
    EmptyTree,
}

/// Binary hash tree over a batch of equal-length messages.
///
/// Level 0 holds the zero-padded raw messages (the messages act as leaf
/// hashes directly); each higher level holds the sorted-pair Keccak-256
/// digests of the level below, terminating at a single root. Because pairs
/// are sorted before hashing, proofs carry no left/right flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerkleTree {
    levels: Vec<Vec<Vec<u8>>>,
}

impl MerkleTree {
    /// Build a tree from a non-empty list of equal-length messages.
    ///
    /// The list is padded on the right with zero-filled messages (same
    /// length as `messages[0]`) up to the next power of two, so the tree is
    /// always perfect. Mixed message lengths are rejected rather than
    /// silently coerced.
    pub fn build(messages: &[Vec<u8>]) -> Result<Self, MerkleError> {
        if messages.is_empty() {
            return Err(MerkleError::InvalidInput("empty message list"));
        }
        let width = messages[0].len();
        if width == 0 {
            return Err(MerkleError::InvalidInput("empty message"));
        }
        if messages.iter().any(|m| m.len() != width) {
            return Err(MerkleError::InvalidInput("heterogeneous message lengths"));
        }

        let mut level: Vec<Vec<u8>> = messages.to_vec();
        level.resize(messages.len().next_power_of_two(), vec![0u8; width]);

        let mut levels = Vec::new();
        while level.len() > 1 {
            // Pairs within one level are independent; barrier between levels
            let next: Vec<Vec<u8>> = level
                .par_chunks(2)
                .map(|pair| h_sorted_pair(&pair[0], &pair[1]).to_vec())
                .collect();
            levels.push(level);
            level = next;
        }
        levels.push(level);
        Ok(Self { levels })
    }

    /// Tree height: number of pairing levels above the leaves.
    pub fn height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    /// The single top-level entry. For a one-message tree this is the raw
    /// message itself, since no pairing step ran.
    pub fn root(&self) -> Result<Vec<u8>, MerkleError> {
        match self.levels.last() {
            Some(top) if top.len() == 1 => Ok(top[0].clone()),
            _ => Err(MerkleError::EmptyTree),
        }
    }

    /// Sibling path for one message, leaf-to-root order, `height()` entries.
    ///
    /// The message must equal a level-0 entry byte-for-byte. At each level
    /// the sibling is `index ^ 1`; the walk then moves to `index >> 1`.
    pub fn proof(&self, message: &[u8]) -> Result<Vec<Vec<u8>>, MerkleError> {
        let leaves = self.levels.first().ok_or(MerkleError::EmptyTree)?;
        let mut idx = leaves
            .iter()
            .position(|m| m.as_slice() == message)
            .ok_or(MerkleError::NotFound)?;

        let mut path = Vec::with_capacity(self.height());
        for level in &self.levels[..self.levels.len() - 1] {
            path.push(level[idx ^ 1].clone());
            idx >>= 1;
        }
        Ok(path)
    }
}

/// Stateless proof check: recompute the root from one leaf and its sibling
/// path, applying the same sorted-pair rule as construction.
///
/// Holding only a root, a verifier needs no live tree; this is the function
/// composite authorization builds on.
pub fn verify_proof(leaf: &[u8], proof: &[Vec<u8>], root: &[u8]) -> bool {
    let mut computed = leaf.to_vec();
    for sibling in proof {
        computed = h_sorted_pair(&computed, sibling).to_vec();
    }
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(texts: &[&str]) -> Vec<Vec<u8>> {
        texts.iter().map(|t| t.as_bytes().to_vec()).collect()
    }

    #[test]
    fn round_trip_all_indices() {
        let leaves = msgs(&["m0", "m1", "m2", "m3"]);
        let mt = MerkleTree::build(&leaves).unwrap();
        let root = mt.root().unwrap();
        assert_eq!(mt.height(), 2);
        assert_eq!(mt.leaf_count(), 4);
        for m in &leaves {
            let path = mt.proof(m).unwrap();
            assert_eq!(path.len(), 2);
            assert!(verify_proof(m, &path, &root));
        }
    }

    #[test]
    fn rejects_tampered_leaf_path_and_root() {
        let leaves = msgs(&["m0", "m1", "m2", "m3"]);
        let mt = MerkleTree::build(&leaves).unwrap();
        let root = mt.root().unwrap();
        let mut path = mt.proof(b"m2").unwrap();

        // Wrong leaf content
        assert!(!verify_proof(b"m2x", &path, &root));
        // Single-bit flip in the root
        let mut bad_root = root.clone();
        bad_root[0] ^= 1;
        assert!(!verify_proof(b"m2", &path, &bad_root));
        // Single-bit flip in a sibling
        path[0][0] ^= 1;
        assert!(!verify_proof(b"m2", &path, &root));
    }

    #[test]
    fn sibling_swap_keeps_root() {
        // Physically swapping a pair's children must not change the root
        let a = msgs(&["m0", "m1", "m2", "m3"]);
        let b = msgs(&["m1", "m0", "m2", "m3"]);
        let ra = MerkleTree::build(&a).unwrap().root().unwrap();
        let rb = MerkleTree::build(&b).unwrap().root().unwrap();
        assert_eq!(ra, rb);
    }

    #[test]
    fn odd_count_pads_and_still_proves() {
        let leaves = msgs(&["a", "b", "c"]);
        let mt = MerkleTree::build(&leaves).unwrap();
        assert_eq!(mt.height(), 2);
        assert_eq!(mt.leaf_count(), 4); // one synthetic zero leaf appended
        let root = mt.root().unwrap();
        for m in &leaves {
            let path = mt.proof(m).unwrap();
            assert_eq!(path.len(), 2);
            assert!(verify_proof(m, &path, &root));
        }
    }

    #[test]
    fn five_leaves_pad_to_eight() {
        let leaves = msgs(&["v0", "v1", "v2", "v3", "v4"]);
        let mt = MerkleTree::build(&leaves).unwrap();
        assert_eq!(mt.height(), 3);
        assert_eq!(mt.leaf_count(), 8);
        let root = mt.root().unwrap();
        for m in &leaves {
            assert!(verify_proof(m, &mt.proof(m).unwrap(), &root));
        }
    }

    #[test]
    fn single_message_tree() {
        let leaves = msgs(&["solo"]);
        let mt = MerkleTree::build(&leaves).unwrap();
        assert_eq!(mt.height(), 0);
        let root = mt.root().unwrap();
        assert_eq!(root, b"solo".to_vec());
        let path = mt.proof(b"solo").unwrap();
        assert!(path.is_empty());
        assert!(verify_proof(b"solo", &path, &root));
    }

    #[test]
    fn unknown_message_is_not_found() {
        let mt = MerkleTree::build(&msgs(&["m0", "m1"])).unwrap();
        assert_eq!(mt.proof(b"zz").unwrap_err(), MerkleError::NotFound);
    }

    #[test]
    fn rejects_bad_construction_inputs() {
        assert_eq!(
            MerkleTree::build(&[]).unwrap_err(),
            MerkleError::InvalidInput("empty message list")
        );
        assert_eq!(
            MerkleTree::build(&[vec![]]).unwrap_err(),
            MerkleError::InvalidInput("empty message")
        );
        assert_eq!(
            MerkleTree::build(&msgs(&["ab", "abc"])).unwrap_err(),
            MerkleError::InvalidInput("heterogeneous message lengths")
        );
    }

    #[test]
    fn proofs_are_deterministic() {
        let leaves = msgs(&["m0", "m1", "m2"]);
        let t1 = MerkleTree::build(&leaves).unwrap();
        let t2 = MerkleTree::build(&leaves).unwrap();
        assert_eq!(t1.root().unwrap(), t2.root().unwrap());
        assert_eq!(t1.proof(b"m1").unwrap(), t2.proof(b"m1").unwrap());
    }
}
