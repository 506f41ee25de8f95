use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one file per collection.
    pub data_dir: PathBuf,
    /// Bucket capacity in bytes. The unit of mapping and indexing; a read
    /// never maps more than one bucket at a time.
    pub bucket_capacity: usize,
    /// Entries in the compiled-pattern LRU cache.
    pub pattern_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            bucket_capacity: 4 * 1024,
            pattern_cache_size: 128,
        }
    }
}
