use std::error::Error;
use thiserror::Error;

use crate::dao::models::SessionEntity;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The stored value exists but cannot be decoded into a session record.
    #[error("malformed room record `{key}`")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a decoding error for the record stored under `key`.
    pub fn malformed(key: impl Into<String>, source: serde_json::Error) -> Self {
        StorageError::Malformed {
            key: key.into(),
            source,
        }
    }
}

/// A record was handed to a store under a key other than its own room code.
#[derive(Debug, Error)]
#[error("record for room `{record}` cannot be stored under `{key}`")]
pub struct KeyMismatch {
    pub key: String,
    pub record: String,
}

/// Refuse to store `record` anywhere but under its own room code.
pub fn ensure_record_key(session_id: &str, record: &SessionEntity) -> StorageResult<()> {
    if record.id == session_id {
        return Ok(());
    }
    Err(StorageError::unavailable(
        format!("cannot write room `{session_id}`"),
        KeyMismatch {
            key: session_id.to_string(),
            record: record.id.clone(),
        },
    ))
}
