//! Core data model types for smt_db

mod hash;
mod hex;
mod path;

pub use hash::Hash;
pub use hex::{is_hex, Key, Value, MAX_KEY_DIGITS};
pub use path::{first_common_prefix_len, last_non_zero_index, Direction, Path, TREE_DEPTH};
