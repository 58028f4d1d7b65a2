// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy for every public storage operation.
//!
//! Backends report failures as `anyhow::Error`; each operation wraps the
//! cause at its own boundary into one [`StorageError`] kind, keeping the
//! original error reachable through `source()`.

use std::time::Duration;
use thiserror::Error;

/// Top-level code shared by every storage failure.
pub const FILES_STORAGE_ERROR: &str = "FILES_STORAGE_ERROR";

/// User-facing message attached to every envelope.
pub const FILES_STORAGE_MESSAGE: &str = "Files storage error. Please contact your administrator.";

/// Result alias for the public API.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Enumeration failed or a listing page could not be retrieved.
    #[error("failed to list objects in bucket `{bucket}` (prefix `{prefix}`)")]
    List {
        bucket: String,
        prefix: String,
        #[source]
        source: anyhow::Error,
    },

    /// A per-object body retrieval failed.
    #[error("failed to fetch `{key}` from bucket `{bucket}`")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The write failed on every attempt; `source` is the last cause.
    #[error("failed to upload `{key}` to bucket `{bucket}` after {attempts} attempt(s)")]
    Upload {
        bucket: String,
        key: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to sign URL for `{key}` in bucket `{bucket}`")]
    Sign {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A single backend call exceeded the configured call timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Serializable summary of a failure, suitable for returning to API callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub kind: &'static str,
    pub body: &'static str,
    pub exception_code: &'static str,
}

impl StorageError {
    /// Stable machine-readable code for this failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::List { .. } => "STORAGE_LIST_ERROR",
            StorageError::Fetch { .. } => "STORAGE_FETCH_ERROR",
            StorageError::Upload { .. } => "STORAGE_UPLOAD_ERROR",
            StorageError::Sign { .. } => "STORAGE_SIGN_ERROR",
            StorageError::Timeout { .. } => "STORAGE_TIMEOUT",
            StorageError::InvalidInput(_) => "STORAGE_INVALID_INPUT",
            StorageError::Config(_) => "STORAGE_CONFIG_ERROR",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let exception_code = match self {
            StorageError::Timeout { .. } => "GATEWAY_TIMEOUT",
            _ => "BAD_REQUEST",
        };
        ErrorEnvelope {
            code: FILES_STORAGE_ERROR,
            kind: self.code(),
            body: FILES_STORAGE_MESSAGE,
            exception_code,
        }
    }

    /// The underlying backend error, if this kind carries one.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            StorageError::List { source, .. }
            | StorageError::Fetch { source, .. }
            | StorageError::Upload { source, .. }
            | StorageError::Sign { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }

    /// Wrap `cause` with `wrap`, unless the cause is a call timeout, which is
    /// surfaced as [`StorageError::Timeout`] instead.
    pub(crate) fn classify(
        cause: anyhow::Error,
        wrap: impl FnOnce(anyhow::Error) -> StorageError,
    ) -> StorageError {
        match cause.downcast_ref::<CallTimedOut>() {
            Some(t) => StorageError::Timeout {
                operation: t.operation.clone(),
                after: t.after,
            },
            None => wrap(cause),
        }
    }
}

/// Raised by [`crate::backend::timed`] when a backend call outlives its budget.
#[derive(Error, Debug, Clone)]
#[error("{operation} timed out after {after:?}")]
pub struct CallTimedOut {
    pub operation: String,
    pub after: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let list = StorageError::List {
            bucket: "b".into(),
            prefix: String::new(),
            source: anyhow::anyhow!("AccessDenied"),
        };
        assert_eq!(list.code(), "STORAGE_LIST_ERROR");
        assert_eq!(StorageError::InvalidInput("x".into()).code(), "STORAGE_INVALID_INPUT");
    }

    #[test]
    fn test_envelope_uses_shared_code() {
        let err = StorageError::Sign {
            bucket: "b".into(),
            key: "k".into(),
            source: anyhow::anyhow!("boom"),
        };
        let env = err.envelope();
        assert_eq!(env.code, FILES_STORAGE_ERROR);
        assert_eq!(env.kind, "STORAGE_SIGN_ERROR");
        assert_eq!(env.body, FILES_STORAGE_MESSAGE);
        assert_eq!(env.exception_code, "BAD_REQUEST");

        let timeout = StorageError::Timeout {
            operation: "GetObject".into(),
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.envelope().exception_code, "GATEWAY_TIMEOUT");
    }

    #[test]
    fn test_source_chain_keeps_cause() {
        use std::error::Error as _;
        let err = StorageError::Fetch {
            bucket: "b".into(),
            key: "k".into(),
            source: anyhow::anyhow!("connection reset"),
        };
        let source = err.source().expect("fetch error has a source");
        assert_eq!(source.to_string(), "connection reset");
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_classify_turns_timeouts_into_timeout_kind() {
        let cause = anyhow::Error::new(CallTimedOut {
            operation: "PutObject".into(),
            after: Duration::from_millis(50),
        });
        let err = StorageError::classify(cause, |source| StorageError::Upload {
            bucket: "b".into(),
            key: "k".into(),
            attempts: 1,
            source,
        });
        assert!(err.is_timeout());

        let err = StorageError::classify(anyhow::anyhow!("nope"), |source| StorageError::Sign {
            bucket: "b".into(),
            key: "k".into(),
            source,
        });
        assert_eq!(err.code(), "STORAGE_SIGN_ERROR");
    }
}
