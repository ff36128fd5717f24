// crates/ecdysis-core/src/error.rs

use thiserror::Error;

/// Protocol-wide error types for the Ecdysis upgrade subsystem.
#[derive(Debug, Error)]
pub enum EcdysisError {
    /// A pending upgrade with an equal descriptor already exists.
    #[error("upgrade already pending")]
    AlreadyPending,

    /// The upgrade has already started (height recorded or a stage completed)
    /// and can no longer be cancelled.
    #[error("upgrade already in progress")]
    UpgradeInProgress,

    /// The submitted descriptor failed basic validation.
    #[error("Bad upgrade descriptor: {0}")]
    BadDescriptor(String),

    /// The running binary cannot execute a due upgrade.
    #[error("Incompatible binary for upgrade {name}: requires {required}, running {running}")]
    IncompatibleBinary {
        name: String,
        required: String,
        running: String,
    },

    /// No migration handler is registered under the given upgrade name.
    #[error("Migration handler not found: {0}")]
    HandlerNotFound(String),

    /// A migration handler was registered twice under the same name.
    #[error("Migration handler already registered: {0}")]
    DuplicateHandler(String),

    /// A migration handler stage failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Storage layer error (RocksDB, in-memory store).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key not found in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted or observed state contradicts an upgrade invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The upgrade manager has been closed and released its store.
    #[error("upgrade manager is closed")]
    Closed,
}

impl EcdysisError {
    /// Whether the node must halt rather than keep running after this error.
    ///
    /// Missing handlers, incompatible binaries, and invariant violations mean
    /// the node cannot correctly execute an upgrade it has committed to.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EcdysisError::IncompatibleBinary { .. }
                | EcdysisError::HandlerNotFound(_)
                | EcdysisError::InvariantViolation(_)
        )
    }

    /// Whether this is an expected conflict the operator resolves by choosing
    /// a different action.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EcdysisError::AlreadyPending | EcdysisError::UpgradeInProgress
        )
    }
}

impl From<serde_json::Error> for EcdysisError {
    fn from(e: serde_json::Error) -> Self {
        EcdysisError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(EcdysisError::AlreadyPending.is_conflict());
        assert!(EcdysisError::UpgradeInProgress.is_conflict());
        assert!(!EcdysisError::AlreadyPending.is_fatal());

        assert!(EcdysisError::HandlerNotFound("v2".into()).is_fatal());
        assert!(EcdysisError::InvariantViolation("height".into()).is_fatal());
        assert!(EcdysisError::IncompatibleBinary {
            name: "v2".into(),
            required: "2.0.0".into(),
            running: "1.4.0".into(),
        }
        .is_fatal());

        assert!(!EcdysisError::Storage("disk full".into()).is_fatal());
        assert!(!EcdysisError::Storage("disk full".into()).is_conflict());
    }
}
