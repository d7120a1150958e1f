use std::path::PathBuf;

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mutation was attempted through a read-only transaction.
    #[error("transaction is not writable")]
    TxNotWritable,

    /// The named bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The key holds a bucket where a value was expected, or the reverse.
    #[error("incompatible value at key {0}")]
    IncompatibleValue(String),

    /// Keys must be non-empty.
    #[error("key required")]
    EmptyKey,

    /// The snapshot file failed validation on open.
    #[error("corrupt database file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Encoding or decoding of the snapshot payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn key_name(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
