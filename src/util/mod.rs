use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub mod logger;
pub mod memory_usage;
pub mod timer;

/// Splits `total_len` items into contiguous ranges, one per worker. The last worker also takes
/// the remainder.
pub fn get_worker_indices(
    total_len: usize,
    worker_index: usize,
    worker_count: usize,
) -> (usize, usize) {
    let data_per_worker = total_len / worker_count;
    let left_index = data_per_worker * worker_index;
    let right_index = if (worker_index + 1) == worker_count {
        // Handle extra elements.
        total_len
    } else {
        data_per_worker * (worker_index + 1)
    };
    (left_index, right_index)
}

/// The partition that owns `key` among `partition_count` partitions. Stable for the lifetime of
/// the process.
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub fn partition_of<K: Hash>(key: &K, partition_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partition_count as u64) as usize
}
