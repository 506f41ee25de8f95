use std::fs::{File, OpenOptions};

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Single-owner guarantee for a data directory: one store process may hold
/// the exclusive lock at a time.
#[derive(Debug)]
pub struct FileLock {
    pub file: File,
    pub exclusive: bool,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout, exclusive: bool) -> Result<Self> {
        let lock_path = storage.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use libc::{LOCK_EX, LOCK_NB, LOCK_SH, flock};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            let operation = if exclusive { LOCK_EX } else { LOCK_SH } | LOCK_NB;

            unsafe {
                if flock(fd, operation) != 0 {
                    return Err(Error::new(
                        ErrorKind::IoUnavailable,
                        format!(
                            "data directory {:?} is locked by another owner",
                            storage.base_dir
                        ),
                    ));
                }
            }
        }

        Ok(FileLock { file, exclusive })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{LOCK_UN, flock};
            use std::os::unix::io::AsRawFd;

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
