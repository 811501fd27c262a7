//! Sync error types.

use thiserror::Error;

/// Errors that can occur talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The remote refused a write or read for this client.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network blip or server hiccup; worth retrying.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The remote sent something this client cannot understand.
    #[error("Sync protocol error: {0}")]
    Protocol(String),

    #[error("Not connected to the sync server")]
    NotConnected,
}

impl SyncError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SyncError::Transient("reset".into()).is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::PermissionDenied("read-only".into()).is_retryable());
        assert!(!SyncError::Protocol("bad frame".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SyncError::PermissionDenied("read-only".into()).to_string(),
            "Permission denied: read-only"
        );
    }
}
