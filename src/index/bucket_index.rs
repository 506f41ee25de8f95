use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::debug;

use crate::codec::record as codec;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CollectionStats;
use crate::core::types::Record;
use crate::index::bucket::{Bucket, BucketRef};
use crate::mmap::region::{MapMode, MappedRegion};
use crate::storage::layout::StorageLayout;

/// Per-collection bucket descriptors plus the bookkeeping needed to keep
/// them honest against the file.
#[derive(Debug, Default)]
struct CollectionIndex {
    buckets: Vec<Bucket>,
    /// The one field every record derives its key from, when they agree.
    key_field: Option<String>,
    mixed_key_fields: bool,
    /// Mirror of the backing file's length; a disagreement with the
    /// filesystem means the file changed under us and forces a rebuild.
    file_len: u64,
    record_count: usize,
    last_rebuild: Option<SystemTime>,
}

impl CollectionIndex {
    fn observe_key_field(&mut self, record: &Record) {
        if self.mixed_key_fields {
            return;
        }
        match (&self.key_field, record.key_field()) {
            (None, Some(field)) => self.key_field = Some(field.to_string()),
            (Some(known), Some(field)) if known.as_str() != field => {
                self.key_field = None;
                self.mixed_key_fields = true;
            }
            _ => {}
        }
    }

    /// Places one scanned record into the tail bucket, or opens a new one
    /// when the tail is at capacity. Used while building from a scan.
    fn place(&mut self, record: &Record, offset: u64, len: u64, capacity: u64) {
        let key = record.key().unwrap_or("");
        self.observe_key_field(record);
        match self.buckets.last_mut() {
            Some(last) if last.len() + len <= capacity => {
                last.end += len;
                last.record_count += 1;
                last.widen(key);
            }
            _ => self.buckets.push(Bucket::for_record(offset, len, key)),
        }
        self.record_count += 1;
    }
}

/// In-memory map from collection to bucket descriptors. A cache, never the
/// source of truth: it is derivable from the file at any time, so losing
/// it costs a rescan, never correctness. Built lazily on first touch.
pub struct BucketIndex {
    layout: Arc<StorageLayout>,
    capacity: u64,
    collections: RwLock<HashMap<String, CollectionIndex>>,
}

impl BucketIndex {
    pub fn new(layout: Arc<StorageLayout>, capacity: usize) -> Self {
        BucketIndex {
            layout,
            capacity: capacity.max(1) as u64,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Buckets that could hold `key`, in file order; all buckets when no
    /// key bound is available. Correctness over cleverness: anything that
    /// cannot be pruned is scanned.
    pub fn locate(&self, collection: &str, key: Option<&str>) -> Result<Vec<BucketRef>> {
        self.ensure(collection)?;
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| key.is_none_or(|key| bucket.covers_key(key)))
            .map(|(ordinal, bucket)| BucketRef {
                ordinal,
                bucket: bucket.clone(),
            })
            .collect())
    }

    /// The field name predicates may derive a key bound from, when every
    /// record in the collection agrees on one.
    pub fn key_field(&self, collection: &str) -> Result<Option<String>> {
        self.ensure(collection)?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|entry| entry.key_field.clone()))
    }

    /// Accounts a record just appended at the file's old end, then splits
    /// any bucket the append pushed past capacity.
    pub fn record_appended(&self, collection: &str, record: &Record, len: u64) -> Result<()> {
        let path = self.layout.collection_path(collection)?;
        let mut collections = self.collections.write();
        let Some(entry) = collections.get_mut(collection) else {
            // never indexed; the lazy rebuild will see the appended bytes
            drop(collections);
            return self.rebuild(collection);
        };
        let key = record.key().unwrap_or("");
        let offset = entry.file_len;
        entry.observe_key_field(record);
        match entry.buckets.last_mut() {
            Some(last) => {
                last.end += len;
                last.record_count += 1;
                last.widen(key);
            }
            None => entry.buckets.push(Bucket::for_record(offset, len, key)),
        }
        entry.record_count += 1;
        entry.file_len += len;
        self.split_over_capacity(&path, entry)
    }

    /// Accounts a removal of `len` bytes from bucket `ordinal`: the bucket
    /// shrinks, every trailing bucket shifts left, and an emptied bucket
    /// is dropped. min/max are left as-is; a wide range only over-includes.
    pub fn record_removed(&self, collection: &str, ordinal: usize, len: u64) -> Result<()> {
        let mut collections = self.collections.write();
        let Some(entry) = collections.get_mut(collection) else {
            drop(collections);
            return self.rebuild(collection);
        };
        let Some(bucket) = entry.buckets.get_mut(ordinal) else {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!("bucket {ordinal} out of range for {collection}"),
            ));
        };
        if bucket.len() < len || bucket.record_count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!("bucket {ordinal} cannot give up {len} bytes"),
            ));
        }
        bucket.end -= len;
        bucket.record_count -= 1;
        let emptied = bucket.is_empty();
        for trailing in &mut entry.buckets[ordinal + 1..] {
            trailing.start -= len;
            trailing.end -= len;
        }
        if emptied {
            entry.buckets.remove(ordinal);
        }
        entry.record_count -= 1;
        entry.file_len -= len;
        Ok(())
    }

    /// Full streaming rescan of the collection's file. Linear in file
    /// size, bounded memory; always safe to call.
    pub fn rebuild(&self, collection: &str) -> Result<()> {
        let path = self.layout.collection_path(collection)?;
        let mut entry = CollectionIndex {
            last_rebuild: Some(SystemTime::now()),
            ..CollectionIndex::default()
        };
        if path.exists() {
            let file = fs::File::open(&path)?;
            entry.file_len = file.metadata()?.len();
            let mut reader = BufReader::new(file);
            let mut offset = 0u64;
            let mut pending = Vec::new();
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line)? == 0 {
                    if !pending.is_empty() {
                        return Err(Error::new(
                            ErrorKind::MalformedRecord,
                            format!("truncated record at end of collection {collection:?}"),
                        ));
                    }
                    break;
                }
                pending.extend_from_slice(&line);
                if line == b"\n" {
                    let record = codec::parse(&pending)?;
                    let len = pending.len() as u64;
                    entry.place(&record, offset, len, self.capacity);
                    offset += len;
                    pending.clear();
                }
            }
        }
        debug!(
            collection,
            buckets = entry.buckets.len(),
            records = entry.record_count,
            "rebuilt bucket index"
        );
        self.collections
            .write()
            .insert(collection.to_string(), entry);
        Ok(())
    }

    pub fn stats(&self, collection: &str) -> Result<CollectionStats> {
        self.ensure(collection)?;
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("collection {collection:?} is not indexed"),
            ));
        };
        Ok(CollectionStats {
            record_count: entry.record_count,
            file_size_bytes: entry.file_len,
            bucket_count: entry.buckets.len(),
            last_rebuild: entry.last_rebuild,
        })
    }

    /// Rebuilds when the index is missing or the file length disagrees
    /// with the filesystem (an external modification).
    fn ensure(&self, collection: &str) -> Result<()> {
        let disk_len = self.layout.collection_len(collection)?;
        {
            let collections = self.collections.read();
            if let Some(entry) = collections.get(collection) {
                if entry.file_len == disk_len {
                    return Ok(());
                }
            }
        }
        self.rebuild(collection)
    }

    /// The only structural mutation of the layout: an over-capacity bucket
    /// is divided at its median record boundary and each half's key bounds
    /// are recomputed from the file.
    fn split_over_capacity(&self, path: &Path, entry: &mut CollectionIndex) -> Result<()> {
        let mut ordinal = 0;
        while ordinal < entry.buckets.len() {
            let bucket = &entry.buckets[ordinal];
            if bucket.len() <= self.capacity || bucket.record_count < 2 {
                ordinal += 1;
                continue;
            }
            let spans = scan_spans(path, bucket.start..bucket.end)?;
            if spans.len() < 2 {
                ordinal += 1;
                continue;
            }
            let (left, right) = spans.split_at(spans.len() / 2);
            debug!(
                start = bucket.start,
                end = bucket.end,
                at = right[0].offset,
                "split bucket"
            );
            let halves = [bucket_from_spans(left), bucket_from_spans(right)];
            entry.buckets.splice(ordinal..ordinal + 1, halves);
            // revisit the left half; an oversized half splits again
        }
        Ok(())
    }
}

struct RecordSpan {
    offset: u64,
    len: u64,
    key: String,
}

/// Record boundaries and keys inside one bucket, read through a scoped
/// mapping of exactly that bucket.
fn scan_spans(path: &Path, range: Range<u64>) -> Result<Vec<RecordSpan>> {
    let region = MappedRegion::acquire(path, range.clone(), MapMode::Read)?;
    let mut spans = Vec::new();
    for item in codec::scan(region.as_slice()) {
        let scanned = item?;
        spans.push(RecordSpan {
            offset: range.start + scanned.offset as u64,
            len: scanned.len as u64,
            key: scanned.record.key().unwrap_or("").to_string(),
        });
    }
    Ok(spans)
}

fn bucket_from_spans(spans: &[RecordSpan]) -> Bucket {
    // callers guarantee a non-empty slice of contiguous spans
    let first = &spans[0];
    let mut bucket = Bucket::for_record(first.offset, first.len, &first.key);
    for span in &spans[1..] {
        bucket.end = span.offset + span.len;
        bucket.record_count += 1;
        bucket.widen(&span.key);
    }
    bucket
}
