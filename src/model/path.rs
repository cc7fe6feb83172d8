//! Path codec: key -> fixed sequence of left/right directions
//!
//! Level `i` of a key's path is bit `i` of the key's integer value, least
//! significant bit first. Every path has exactly [`TREE_DEPTH`] levels.

use super::{Hash, Key};

/// Number of levels in every path
pub const TREE_DEPTH: usize = Hash::BITS;

/// Which child to descend into at a given level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Order a carried node and its side node as `(left, right)` children
    pub fn arrange(self, node: Hash, side: Hash) -> (Hash, Hash) {
        match self {
            Direction::Left => (node, side),
            Direction::Right => (side, node),
        }
    }

    /// Pick `(taken, untaken)` out of an internal node's children
    pub fn select(self, left: Hash, right: Hash) -> (Hash, Hash) {
        match self {
            Direction::Left => (left, right),
            Direction::Right => (right, left),
        }
    }
}

/// The path of a key through the tree
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Path([u8; 32]);

impl Path {
    pub fn of(key: &Key) -> Self {
        Path(*key.as_bytes())
    }

    /// Direction at `level` (0 = root's children)
    pub fn direction(&self, level: usize) -> Direction {
        debug_assert!(level < TREE_DEPTH, "level {} out of range", level);
        let byte = self.0[31 - level / 8];
        if (byte >> (level % 8)) & 1 == 1 {
            Direction::Right
        } else {
            Direction::Left
        }
    }

    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        (0..TREE_DEPTH).map(move |level| self.direction(level))
    }

    /// All-left path, a starting point for accumulating directions
    pub(crate) const ROOT: Path = Path([0u8; 32]);

    /// This path with `level` set to `direction`
    pub(crate) fn with_direction(mut self, level: usize, direction: Direction) -> Path {
        let mask = 1u8 << (level % 8);
        let byte = &mut self.0[31 - level / 8];
        match direction {
            Direction::Left => *byte &= !mask,
            Direction::Right => *byte |= mask,
        }
        self
    }
}

impl std::fmt::Debug for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Shallowest levels first, truncated for readability
        let bits: String = self
            .directions()
            .take(16)
            .map(|d| if d == Direction::Right { '1' } else { '0' })
            .collect();
        write!(f, "Path({}..)", bits)
    }
}

/// Length of the common leading run of directions of two paths
pub fn first_common_prefix_len(a: &Path, b: &Path) -> usize {
    // Paths start at the least significant bit, so the shared prefix is the
    // number of trailing zero bits of a ^ b.
    for (i, (x, y)) in a.0.iter().rev().zip(b.0.iter().rev()).enumerate() {
        let diff = x ^ y;
        if diff != 0 {
            return i * 8 + diff.trailing_zeros() as usize;
        }
    }
    TREE_DEPTH
}

/// Index of the last node that is not the zero node
pub fn last_non_zero_index(nodes: &[Hash]) -> Option<usize> {
    nodes.iter().rposition(|node| !node.is_zero())
}
