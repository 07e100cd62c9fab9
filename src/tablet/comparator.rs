//! Key ordering used by block builders, block seeks and the index.

use std::cmp::Ordering;
use std::fmt::Debug;

/// Total order over keys.
///
/// A tablet must be read with the same comparator it was written with.
pub trait Comparator: Send + Sync + Debug {
    /// Name of the ordering, for diagnostics.
    fn name(&self) -> &'static str;

    /// Compare two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain byte-lexicographic ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
