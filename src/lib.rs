pub mod api;
pub mod codec;
pub mod core;
pub mod index;
pub mod mmap;
pub mod query;
pub mod storage;
pub mod store;

/*
┌──────────────────────────── BUCKSTORE LAYOUT ────────────────────────────┐
│                                                                          │
│  api::request                                                            │
│    Request { op, collection, records, predicate } ── dispatch ──┐        │
│                                                                 ▼        │
│  store::record_store::RecordStore                                        │
│    create / read / modify / delete                                       │
│      │            │                                                      │
│      │            └── RecordScan (lazy, one bucket mapped at a time)     │
│      │                                                                   │
│      ├── store::locks::CollectionLocks   (per-collection RwLock)         │
│      ├── query::predicate::Predicate     (Equals | Pattern clauses)      │
│      │     └── query::cache::PatternCache (LRU of compiled regexes)      │
│      ├── index::bucket_index::BucketIndex                                │
│      │     └── Bucket { start, end, min_key, max_key, record_count }     │
│      │         locate / record_appended / record_removed / rebuild       │
│      ├── mmap::region::MappedRegion      (scoped, exact-range mapping)   │
│      ├── codec::record                   (parse / serialize / scan)      │
│      └── storage::layout + file_lock     (one file per collection)       │
│                                                                          │
│  on disk: <data_dir>/<collection> — `field: value` lines, blank-line     │
│  terminated records, no bucket markers (buckets live only in memory)     │
└──────────────────────────────────────────────────────────────────────────┘
*/
