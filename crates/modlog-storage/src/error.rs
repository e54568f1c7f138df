//! Event store errors

use modlog_core::EntryId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Entry {0} not found")]
    NotFound(EntryId),

    /// Insert with an id that is already stored
    #[error("Entry {0} already exists")]
    Duplicate(EntryId),

    #[error("Failed to encode entry: {0}")]
    Encode(String),

    /// Stored bytes or index keys no longer decode; the file is damaged or
    /// was written by an incompatible version
    #[error("Failed to decode stored entry: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::Decode(err.to_string())
    }
}

impl StorageError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_entry() {
        let id = EntryId::new();
        let err = StorageError::NotFound(id);
        assert_eq!(err.to_string(), format!("Entry {} not found", id));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
