use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

use crate::core::error::{Error, ErrorKind, Result};

/// Compiled-pattern cache. Predicates tend to repeat, and regex
/// compilation dwarfs a bucket scan for short patterns.
pub struct PatternCache {
    cache: Mutex<LruCache<String, Regex>>,
    capacity: usize,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        PatternCache {
            cache: Mutex::new(LruCache::new(cap)),
            capacity: cap.get(),
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn get_or_compile(&self, pattern: &str) -> Result<Regex> {
        {
            let mut cache = self.cache.lock();
            if let Some(regex) = cache.get(pattern) {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                return Ok(regex.clone());
            }
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let regex = Regex::new(pattern).map_err(|err| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("pattern {pattern:?} does not compile: {err}"),
            )
        })?;
        self.cache.lock().put(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
