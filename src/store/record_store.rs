use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::codec::record as codec;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CollectionStats;
use crate::core::types::Record;
use crate::index::bucket::Bucket;
use crate::index::bucket_index::BucketIndex;
use crate::mmap::region::{self, MapMode, MappedRegion};
use crate::query::cache::PatternCache;
use crate::query::predicate::Predicate;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::store::locks::CollectionLocks;

/// Outcome of a batch operation. Every record of the input batch is
/// accounted for: committed, skipped, or the one that caused a fatal
/// abort (reported through `BatchError`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub committed: usize,
    pub skipped: usize,
}

/// Fatal failure partway through a batch. Records committed before the
/// failure are durable, so a caller may retry exactly the remainder.
#[derive(Debug)]
pub struct BatchError {
    pub committed: usize,
    pub skipped: usize,
    pub source: Error,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "batch aborted after {} committed, {} skipped: {}",
            self.committed, self.skipped, self.source
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

type BatchResult = std::result::Result<BatchReport, BatchError>;

/// Record store for one data directory: orchestrates the bucket index,
/// the mapped-file accessor, and the codec into the four CRUD operations
/// plus the matched scan.
pub struct RecordStore {
    config: Config,
    layout: Arc<StorageLayout>,
    index: BucketIndex,
    locks: CollectionLocks,
    patterns: PatternCache,
    /// Exclusive flock on the data directory for the store's lifetime.
    _dir_lock: FileLock,
}

impl RecordStore {
    pub fn open(config: Config) -> Result<Self> {
        let layout = Arc::new(StorageLayout::new(config.data_dir.clone())?);
        let dir_lock = FileLock::acquire(&layout, true)?;
        let index = BucketIndex::new(layout.clone(), config.bucket_capacity);
        let patterns = PatternCache::new(config.pattern_cache_size);
        Ok(RecordStore {
            config,
            layout,
            index,
            locks: CollectionLocks::new(),
            patterns,
            _dir_lock: dir_lock,
        })
    }

    /// Compiles a wire predicate through the store's pattern cache.
    pub fn predicate(&self, input: &str) -> Result<Predicate> {
        Predicate::parse(input, &self.patterns)
    }

    pub fn pattern_cache(&self) -> &PatternCache {
        &self.patterns
    }

    pub fn stats(&self, collection: &str) -> Result<CollectionStats> {
        self.index.stats(collection)
    }

    /// Appends each record whose primary key is not already present.
    /// Records with a present key are skipped, never an error.
    pub fn create(&self, collection: &str, records: Vec<Record>) -> BatchResult {
        debug!(collection, batch = records.len(), "create records");
        let mut report = BatchReport::default();
        let outcome = (|| -> Result<()> {
            let path = self.layout.collection_path(collection)?;
            let lock = self.locks.for_collection(collection);
            let _writer = lock.write();
            for record in &records {
                let Some(key) = record.key() else {
                    warn!(collection, "dropping keyless record from create batch");
                    report.skipped += 1;
                    continue;
                };
                if self.key_scan(collection, &path, key)?.is_some() {
                    report.skipped += 1;
                    continue;
                }
                self.append_record(collection, &path, record)?;
                report.committed += 1;
            }
            Ok(())
        })();
        finish_batch(report, outcome)
    }

    /// Matched scan. Candidate buckets come from the index, narrowed by
    /// the key the predicate pins down when the collection has a uniform
    /// key field. Matches come back in file order, lazily: a bucket is
    /// mapped only when the iterator reaches it.
    pub fn read(&self, collection: &str, predicate: &Predicate) -> Result<RecordScan> {
        debug!(collection, "read records");
        let path = self.layout.collection_path(collection)?;
        let key_field = self.index.key_field(collection)?;
        let bound = key_field
            .as_deref()
            .and_then(|field| predicate.key_bound(field));
        let buckets = self
            .index
            .locate(collection, bound)?
            .into_iter()
            .map(|bucket_ref| bucket_ref.bucket)
            .collect();
        Ok(RecordScan {
            path,
            predicate: predicate.clone(),
            lock: self.locks.for_collection(collection),
            buckets,
            pending: VecDeque::new(),
        })
    }

    /// Applies each record over the stored record with the same primary
    /// key; a candidate whose key is absent is skipped. Same serialized
    /// length overwrites in place, otherwise the old span is removed and
    /// the replacement appended.
    pub fn modify(&self, collection: &str, records: Vec<Record>) -> BatchResult {
        debug!(collection, batch = records.len(), "modify records");
        let mut report = BatchReport::default();
        let outcome = (|| -> Result<()> {
            let path = self.layout.collection_path(collection)?;
            let lock = self.locks.for_collection(collection);
            let _writer = lock.write();
            for record in &records {
                let Some(key) = record.key() else {
                    report.skipped += 1;
                    continue;
                };
                let Some(found) = self.key_scan(collection, &path, key)? else {
                    report.skipped += 1;
                    continue;
                };
                let bytes = codec::serialize(record);
                if bytes.len() as u64 == found.len {
                    let mut span =
                        MappedRegion::acquire(&path, found.offset..found.offset + found.len, MapMode::Write)?;
                    span.write_at(0, &bytes)?;
                    span.flush()?;
                } else {
                    self.remove_span(collection, &path, &found)?;
                    self.append_record(collection, &path, record)?;
                }
                report.committed += 1;
            }
            Ok(())
        })();
        finish_batch(report, outcome)
    }

    /// Removes each record that is wholly equal (field multiset) to a
    /// stored one; candidates without a match are skipped.
    pub fn delete(&self, collection: &str, records: Vec<Record>) -> BatchResult {
        debug!(collection, batch = records.len(), "delete records");
        let mut report = BatchReport::default();
        let outcome = (|| -> Result<()> {
            let path = self.layout.collection_path(collection)?;
            let lock = self.locks.for_collection(collection);
            let _writer = lock.write();
            for record in &records {
                let Some(found) = self.equal_scan(collection, &path, record)? else {
                    report.skipped += 1;
                    continue;
                };
                self.remove_span(collection, &path, &found)?;
                report.committed += 1;
            }
            Ok(())
        })();
        finish_batch(report, outcome)
    }

    /// First stored record whose primary key equals `key`, if any.
    fn key_scan(&self, collection: &str, path: &Path, key: &str) -> Result<Option<FoundRecord>> {
        self.scan_candidates(collection, path, Some(key), |record| {
            record.key() == Some(key)
        })
    }

    /// First stored record wholly equal to `candidate`, if any. Pruned by
    /// the candidate's key: equal records have equal keys.
    fn equal_scan(
        &self,
        collection: &str,
        path: &Path,
        candidate: &Record,
    ) -> Result<Option<FoundRecord>> {
        self.scan_candidates(collection, path, candidate.key(), |record| {
            record == candidate
        })
    }

    fn scan_candidates(
        &self,
        collection: &str,
        path: &Path,
        key: Option<&str>,
        hit: impl Fn(&Record) -> bool,
    ) -> Result<Option<FoundRecord>> {
        for bucket_ref in self.index.locate(collection, key)? {
            let bucket = &bucket_ref.bucket;
            let region = MappedRegion::acquire(path, bucket.start..bucket.end, MapMode::Read)?;
            for item in codec::scan(region.as_slice()) {
                let scanned = item?;
                if hit(&scanned.record) {
                    return Ok(Some(FoundRecord {
                        ordinal: bucket_ref.ordinal,
                        offset: bucket.start + scanned.offset as u64,
                        len: scanned.len as u64,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Extend, map the appended tail in write mode, write, flush, account.
    fn append_record(&self, collection: &str, path: &Path, record: &Record) -> Result<()> {
        let bytes = codec::serialize(record);
        let old_len = self.layout.collection_len(collection)?;
        let new_len = old_len + bytes.len() as u64;
        region::extend_to(path, new_len)?;
        let mut tail = MappedRegion::acquire(path, old_len..new_len, MapMode::Write)?;
        tail.write_at(0, &bytes)?;
        tail.flush()?;
        drop(tail);
        self.index.record_appended(collection, record, bytes.len() as u64)
    }

    /// Physically removes a record's byte span: the file tail shifts left
    /// one capacity-sized chunk at a time (read into a buffer, then write
    /// — never two mappings at once), the file is truncated by exactly the
    /// span's length, and the index accounts the removal.
    fn remove_span(&self, collection: &str, path: &Path, found: &FoundRecord) -> Result<()> {
        let file_len = self.layout.collection_len(collection)?;
        if found.offset + found.len > file_len {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!(
                    "record span {}..{} exceeds file length {file_len}",
                    found.offset,
                    found.offset + found.len
                ),
            ));
        }
        let mut read_pos = found.offset + found.len;
        let mut write_pos = found.offset;
        while read_pos < file_len {
            let chunk = (self.config.bucket_capacity as u64).min(file_len - read_pos);
            let buffer = {
                let source = MappedRegion::acquire(path, read_pos..read_pos + chunk, MapMode::Read)?;
                source.as_slice().to_vec()
            };
            let mut target =
                MappedRegion::acquire(path, write_pos..write_pos + chunk, MapMode::Write)?;
            target.write_at(0, &buffer)?;
            target.flush()?;
            read_pos += chunk;
            write_pos += chunk;
        }
        region::truncate_to(path, file_len - found.len)?;
        self.index.record_removed(collection, found.ordinal, found.len)
    }
}

/// A stored record's position: the bucket it was found in and its absolute
/// byte span.
struct FoundRecord {
    ordinal: usize,
    offset: u64,
    len: u64,
}

fn finish_batch(report: BatchReport, outcome: Result<()>) -> BatchResult {
    match outcome {
        Ok(()) => Ok(report),
        Err(source) => Err(BatchError {
            committed: report.committed,
            skipped: report.skipped,
            source,
        }),
    }
}

/// Lazy matched scan over one collection. Buckets are mapped read-only,
/// one at a time, under the collection's shared lock; dropping the
/// iterator early means the remaining buckets are never mapped.
pub struct RecordScan {
    path: PathBuf,
    predicate: Predicate,
    lock: Arc<RwLock<()>>,
    buckets: VecDeque<Bucket>,
    pending: VecDeque<Record>,
}

impl Iterator for RecordScan {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            let bucket = self.buckets.pop_front()?;
            let _reader = self.lock.read();
            let region =
                match MappedRegion::acquire(&self.path, bucket.start..bucket.end, MapMode::Read) {
                    Ok(region) => region,
                    Err(err) => {
                        self.buckets.clear();
                        return Some(Err(err));
                    }
                };
            for item in codec::scan(region.as_slice()) {
                match item {
                    Ok(scanned) => {
                        if self.predicate.matches(&scanned.record) {
                            self.pending.push_back(scanned.record);
                        }
                    }
                    Err(err) => {
                        warn!(%err, "skipping unreadable tail of bucket");
                        break;
                    }
                }
            }
        }
    }
}
