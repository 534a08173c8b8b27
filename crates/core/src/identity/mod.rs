//! Cross-document identity of scene objects.
//!
//! Local IDs are not stable across saves, so objects are paired by a
//! content-derived [`MatchKey`]: the node's hierarchy path plus a type tag,
//! an optional script identity and a per-type sibling index. Objects the
//! hierarchy walk never reaches fall back to raw local ID equality.

pub mod match_key;
pub mod matcher;

pub use match_key::MatchKey;
pub use matcher::{DocumentPairing, MatchMap, MatchVia, MatchedPair, UnpairedObject};
