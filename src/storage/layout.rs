use std::fs;
use std::path::PathBuf;

use crate::core::error::{Error, ErrorKind, Result};

/// Data directory holding one backing file per collection, named by the
/// collection.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(StorageLayout { base_dir })
    }

    /// Collection names arrive from the wire and are used verbatim as file
    /// names; anything that could escape the data directory is rejected.
    pub fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || collection.starts_with('.')
            || collection.contains('/')
            || collection.contains('\\')
            || collection.contains('\0')
        {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("invalid collection name {collection:?}"),
            ));
        }
        Ok(self.base_dir.join(collection))
    }

    /// Current length of the collection's backing file; zero when the
    /// collection has never been written.
    pub fn collection_len(&self, collection: &str) -> Result<u64> {
        let path = self.collection_path(collection)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }
}
