use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
///
/// Backends collapse their specific failures into this single shape; callers
/// never branch on the detail, only on storage being unavailable at all.
#[derive(Debug, Error)]
#[error("storage unavailable: {message}")]
pub struct StorageError {
    message: String,
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl StorageError {
    /// Wrap a backend failure together with a human-readable summary.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError {
            message,
            source: Box::new(source),
        }
    }
}
