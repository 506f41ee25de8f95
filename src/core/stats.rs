use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Per-collection statistics for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub record_count: usize,
    pub file_size_bytes: u64,
    pub bucket_count: usize,
    pub last_rebuild: Option<SystemTime>,
}
