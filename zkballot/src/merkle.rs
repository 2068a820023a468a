use crate::*;

/// Depth used for election eligibility trees: up to 2^20 voters.
pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Deepest tree a proof may describe.
pub const MAX_TREE_DEPTH: usize = 32;

/// Sibling path from a leaf to the root of an eligibility tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EligibilityProof {
    /// Sibling hash at each level, leaf level first
    pub path_elements: Vec<FieldElement>,

    /// 0 if the node on the path is a left child at that level, 1 if it is a right child
    pub path_indices: Vec<u8>,

    /// Root the path claims to reach
    pub root: FieldElement,
}

impl EligibilityProof {
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Position of the leaf, reassembled from the path indices.
    pub fn leaf_index(&self) -> u64 {
        self.path_indices
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, bit)| acc | (u64::from(*bit & 1) << level))
    }
}

/// A fixed-depth Merkle commitment over the eligible voters of one election.
///
/// Only the populated prefix of each level is stored; missing right-hand nodes
/// are the precomputed roots of empty subtrees.
#[derive(Clone, Debug)]
pub struct EligibilityTree {
    depth: usize,
    levels: Vec<Vec<FieldElement>>,
    zeros: Vec<FieldElement>,
}

impl EligibilityTree {
    /// Build a tree whose voter `i` is `hash_to_field(identities[i])`.
    pub fn build<I, T>(identities: I, depth: usize) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let hashed: Vec<FieldElement> = identities
            .into_iter()
            .map(|identity| hash_to_field(identity.as_ref()))
            .collect();
        Self::from_identities(&hashed, depth)
    }

    /// Build a tree over identities that are already field elements.
    pub fn from_identities(identities: &[FieldElement], depth: usize) -> Result<Self, Error> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(Error::Config(format!(
                "tree depth must be within 1..={}, found {}",
                MAX_TREE_DEPTH, depth
            )));
        }
        let capacity = 1usize << depth;
        if identities.len() > capacity {
            return Err(Error::EligibilityTreeFull(capacity));
        }

        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(FieldElement::zero());
        for level in 0..depth {
            let next = hash_pair(&zeros[level], &zeros[level]);
            zeros.push(next);
        }

        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(identities.iter().map(hash_leaf).collect::<Vec<_>>());
        for level in 0..depth {
            let current = &levels[level];
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                let right = pair.get(1).unwrap_or(&zeros[level]);
                next.push(hash_pair(&pair[0], right));
            }
            levels.push(next);
        }

        debug!(
            "built eligibility tree of depth {} over {} voters",
            depth,
            levels[0].len()
        );

        Ok(EligibilityTree {
            depth,
            levels,
            zeros,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of populated leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn root(&self) -> FieldElement {
        match self.levels[self.depth].first() {
            Some(root) => root.clone(),
            None => self.zeros[self.depth].clone(),
        }
    }

    /// Tagged leaf node at `index`. This is not the voter identity itself.
    pub fn leaf(&self, index: usize) -> Option<&FieldElement> {
        self.levels[0].get(index)
    }

    /// Position of a raw identity in the tree, if present.
    pub fn position(&self, identity: &[u8]) -> Option<usize> {
        let leaf = hash_leaf(&hash_to_field(identity));
        self.levels[0].iter().position(|l| *l == leaf)
    }

    /// Sibling path from leaf `index` to the root. `None` if the leaf is not populated.
    pub fn prove_membership(&self, index: usize) -> Option<EligibilityProof> {
        if index >= self.len() {
            return None;
        }

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut idx = index;
        for level in 0..self.depth {
            let sibling_idx = idx ^ 1;
            let sibling = self.levels[level]
                .get(sibling_idx)
                .unwrap_or(&self.zeros[level]);
            path_elements.push(sibling.clone());
            path_indices.push((idx & 1) as u8);
            idx >>= 1;
        }

        Some(EligibilityProof {
            path_elements,
            path_indices,
            root: self.root(),
        })
    }
}

/// Build a default-depth tree, returning its root alongside it.
pub fn build_tree<I, T>(identities: I) -> Result<(FieldElement, EligibilityTree), Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let tree = EligibilityTree::build(identities, DEFAULT_TREE_DEPTH)?;
    Ok((tree.root(), tree))
}

/// Recompute the root from `identity` and the proof path and compare it with `root`.
///
/// The path must have exactly `depth` levels, the depth the tree was built
/// at. Any structural problem yields `false`; it is never an error.
pub fn verify_membership(
    proof: &EligibilityProof,
    root: &FieldElement,
    identity: &FieldElement,
    depth: usize,
) -> bool {
    if depth == 0
        || depth > MAX_TREE_DEPTH
        || proof.path_elements.len() != depth
        || proof.path_indices.len() != depth
    {
        return false;
    }
    if proof.root != *root {
        return false;
    }

    let mut node = hash_leaf(identity);
    for (sibling, index) in proof.path_elements.iter().zip(proof.path_indices.iter()) {
        node = match index {
            0 => hash_pair(&node, sibling),
            1 => hash_pair(sibling, &node),
            _ => return false,
        };
    }
    node == *root
}
