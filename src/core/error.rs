use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem or OS failure. Fatal for the operation, never retried.
    IoUnavailable,
    /// Bytes that cannot be split into field/value lines. Local to one
    /// record, recovered by dropping it.
    MalformedRecord,
    /// A byte range that does not fit the file it addresses.
    InvalidRange,
    NotFound,
    InvalidInput,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::IoUnavailable,
        };
        Error {
            kind,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
