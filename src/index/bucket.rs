/// A contiguous byte range of a collection's file and the key bounds
/// observed inside it. The unit of mapping and indexing.
///
/// Invariants, per collection: buckets are contiguous, non-overlapping,
/// and cover exactly the file's current length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub start: u64,
    pub end: u64,
    pub min_key: String,
    pub max_key: String,
    pub record_count: usize,
}

impl Bucket {
    /// Opens a bucket around its first record.
    pub fn for_record(start: u64, len: u64, key: &str) -> Self {
        Bucket {
            start,
            end: start + len,
            min_key: key.to_string(),
            max_key: key.to_string(),
            record_count: 1,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Whether a record with `key` could live here. Bounds may be
    /// conservatively wide after removals, so this can over-include but
    /// never excludes a present key.
    pub fn covers_key(&self, key: &str) -> bool {
        self.min_key.as_str() <= key && key <= self.max_key.as_str()
    }

    pub fn widen(&mut self, key: &str) {
        if key < self.min_key.as_str() {
            self.min_key = key.to_string();
        }
        if key > self.max_key.as_str() {
            self.max_key = key.to_string();
        }
    }
}

/// A bucket descriptor plus its ordinal position in the collection's
/// index, so callers can report mutations back precisely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub ordinal: usize,
    pub bucket: Bucket,
}
