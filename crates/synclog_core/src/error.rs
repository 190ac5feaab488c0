//! Error types for synclog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the mutation log engine.
///
/// Callers see two families: [`CoreError::InvalidInput`], raised before the
/// store is touched, and everything else, which means the store could not
/// complete the call. Neither family leaves a partial batch behind.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A push or pull request was malformed.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the request.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] synclog_storage::StorageError),

    /// I/O error outside the backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal contains bytes that are not a valid frame sequence.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A frame's stored checksum does not match its contents.
    #[error("checksum mismatch at offset {offset}: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Offset of the damaged frame.
        offset: u64,
        /// Checksum stored in the frame.
        stored: u32,
        /// Checksum computed over the frame.
        computed: u32,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// A failed batch could not be rolled back; the store refuses further
    /// appends until it is reopened and recovered.
    #[error("store poisoned: rollback of a failed batch did not complete")]
    Poisoned,
}

impl CoreError {
    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Returns true if the caller sent a bad request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::InvalidInput { .. })
    }

    /// Returns true if repeating the whole call may succeed.
    ///
    /// Push and pull never leave partial state, so retrying a storage failure
    /// in full is always safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_) | CoreError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CoreError::invalid_input("empty entityType").is_client_error());
        assert!(!CoreError::invalid_input("x").is_retryable());

        let io = CoreError::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());
        assert!(!io.is_client_error());
        assert!(!CoreError::journal_corruption("bad magic").is_retryable());
    }

    #[test]
    fn checksum_display() {
        let err = CoreError::ChecksumMismatch {
            offset: 42,
            stored: 0xdead_beef,
            computed: 0x0000_0001,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 42"));
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("00000001"));
    }
}
