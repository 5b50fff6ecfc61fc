//! Deterministic Merkle commitments over per user credit amounts.
//!
//! Leaves are `keccak(address ‖ amount)` sorted ascending by hash, inner
//! nodes concatenate their children in ascending byte order. Sorting at both
//! levels makes the tree canonical for any leaf ordering and lets proofs
//! omit sibling side flags.

use {
    model::keccak256,
    primitive_types::{H160, H256, U256},
};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("cannot build a tree without leaves")]
    Empty,
    #[error("credit amounts must be positive")]
    ZeroAmountLeaf,
    #[error("duplicate leaf for one address")]
    DuplicateLeaf,
}

pub fn leaf_hash(address: H160, amount: U256) -> H256 {
    let mut buffer = [0u8; 52];
    buffer[..20].copy_from_slice(address.as_bytes());
    amount.to_big_endian(&mut buffer[20..]);
    H256(keccak256(&buffer))
}

fn parent(a: H256, b: H256) -> H256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buffer = [0u8; 64];
    buffer[..32].copy_from_slice(lo.as_bytes());
    buffer[32..].copy_from_slice(hi.as_bytes());
    H256(keccak256(&buffer))
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Sorted by leaf hash.
    leaves: Vec<(H160, U256, H256)>,
    /// `levels[0]` are the sorted leaf hashes, the last level is the root.
    levels: Vec<Vec<H256>>,
}

impl MerkleTree {
    pub fn new(credits: impl IntoIterator<Item = (H160, U256)>) -> Result<Self, Error> {
        let mut leaves: Vec<(H160, U256, H256)> = credits
            .into_iter()
            .map(|(address, amount)| {
                if amount.is_zero() {
                    return Err(Error::ZeroAmountLeaf);
                }
                Ok((address, amount, leaf_hash(address, amount)))
            })
            .collect::<Result<_, _>>()?;
        if leaves.is_empty() {
            return Err(Error::Empty);
        }
        leaves.sort_by_key(|(_, _, hash)| *hash);
        if leaves.windows(2).any(|pair| pair[0].2 == pair[1].2) {
            return Err(Error::DuplicateLeaf);
        }

        let mut levels = vec![leaves.iter().map(|(_, _, hash)| *hash).collect::<Vec<_>>()];
        while levels.last().map(Vec::len) > Some(1) {
            let previous = levels.last().expect("never empty");
            let next = previous
                .chunks(2)
                .map(|pair| parent(pair[0], *pair.last().expect("chunk is non empty")))
                .collect();
            levels.push(next);
        }
        Ok(Self { leaves, levels })
    }

    pub fn root(&self) -> H256 {
        self.levels.last().expect("never empty")[0]
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Sibling hashes from the leaf up to (excluding) the root. `None` if
    /// `(address, amount)` is not a leaf of this tree.
    pub fn proof(&self, address: H160, amount: U256) -> Option<Vec<H256>> {
        let hash = leaf_hash(address, amount);
        let mut index = self
            .leaves
            .binary_search_by_key(&hash, |(_, _, hash)| *hash)
            .ok()?;
        let mut path = Vec::with_capacity(self.levels.len() - 1);
        for level in &self.levels[..self.levels.len() - 1] {
            // An odd node at the end is paired with itself.
            let sibling = if index % 2 == 0 {
                *level.get(index + 1).unwrap_or(&level[index])
            } else {
                level[index - 1]
            };
            path.push(sibling);
            index /= 2;
        }
        Some(path)
    }
}

/// Recomputes the root from a single leaf and its sibling path. Verification
/// is independent of the tree the proof came from.
pub fn verify(address: H160, amount: U256, proof: &[H256], root: H256) -> bool {
    let mut hash = leaf_hash(address, amount);
    for sibling in proof {
        hash = parent(hash, *sibling);
    }
    hash == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: u64) -> H160 {
        H160::from_low_u64_be(n)
    }

    fn credits(n: u64) -> Vec<(H160, U256)> {
        (1..=n).map(|i| (user(i), U256::from(i) * 10)).collect()
    }

    #[test]
    fn every_leaf_proves_against_the_root() {
        for size in [1u64, 2, 3, 5, 8, 13] {
            let tree = MerkleTree::new(credits(size)).unwrap();
            for (address, amount) in credits(size) {
                let proof = tree.proof(address, amount).unwrap();
                assert!(verify(address, amount, &proof, tree.root()));
            }
        }
    }

    #[test]
    fn tampering_breaks_verification() {
        let tree = MerkleTree::new(credits(5)).unwrap();
        let proof = tree.proof(user(1), 10.into()).unwrap();
        let root = tree.root();
        // Wrong amount.
        assert!(!verify(user(1), 11.into(), &proof, root));
        // Wrong address.
        assert!(!verify(user(6), 10.into(), &proof, root));
        // Tampered path.
        let mut bad_proof = proof.clone();
        bad_proof[0] = H256::from_low_u64_be(1);
        assert!(!verify(user(1), 10.into(), &bad_proof, root));
        // Tampered root.
        assert!(!verify(user(1), 10.into(), &proof, H256::from_low_u64_be(2)));
    }

    #[test]
    fn construction_is_order_independent() {
        let forward = MerkleTree::new(credits(6)).unwrap();
        let mut shuffled = credits(6);
        shuffled.reverse();
        shuffled.swap(0, 3);
        let backward = MerkleTree::new(shuffled).unwrap();
        assert_eq!(forward.root(), backward.root());
    }

    #[test]
    fn single_leaf_tree() {
        let tree = MerkleTree::new(vec![(user(1), 10.into())]).unwrap();
        assert_eq!(tree.root(), leaf_hash(user(1), 10.into()));
        let proof = tree.proof(user(1), 10.into()).unwrap();
        assert!(proof.is_empty());
        assert!(verify(user(1), 10.into(), &proof, tree.root()));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(MerkleTree::new(vec![]).unwrap_err(), Error::Empty);
        assert_eq!(
            MerkleTree::new(vec![(user(1), 0.into())]).unwrap_err(),
            Error::ZeroAmountLeaf
        );
        assert_eq!(
            MerkleTree::new(vec![(user(1), 10.into()), (user(1), 10.into())]).unwrap_err(),
            Error::DuplicateLeaf
        );
    }

    #[test]
    fn unknown_leaf_has_no_proof() {
        let tree = MerkleTree::new(credits(3)).unwrap();
        assert!(tree.proof(user(1), 11.into()).is_none());
    }
}
