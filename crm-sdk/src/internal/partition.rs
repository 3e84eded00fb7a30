//! Splitting batches to fit the remote per-call object limit.

use std::slice::Chunks;

/// Most objects the remote service accepts in one create/update/delete call.
pub const MAX_BATCH_SIZE: usize = 200;

/// Split `items` into consecutive chunks of at most `size` elements.
///
/// The returned iterator is lazy and `Clone`, so it can be walked more than once.
/// Chunks keep the input order, with no gaps or overlaps; only the last one may be
/// shorter than `size`. An empty input yields no chunks.
///
/// # Panics
/// Panics if `size` is zero.
pub fn partition<T>(items: &[T], size: usize) -> Chunks<'_, T> {
    assert!(size > 0, "partition size must be non-zero");
    items.chunks(size)
}
