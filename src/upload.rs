// src/upload.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Single-object upload with a retry budget.

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{timed, PutAck, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::retry::{with_retry, RetryPolicy};

/// A file to upload: the object key and its content as base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub body: String,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, body_base64: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            body: body_base64.into(),
        }
    }

    pub fn from_bytes(file_name: impl Into<String>, data: &[u8]) -> Self {
        Self::new(file_name, STANDARD.encode(data))
    }

    /// Read a local file, storing it under `file_name`.
    pub fn from_path(file_name: impl Into<String>, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read upload source {}", path.display()))?;
        Ok(Self::from_bytes(file_name, &data))
    }

    pub fn decode(&self) -> StorageResult<Bytes> {
        STANDARD
            .decode(self.body.as_bytes())
            .map(Bytes::from)
            .map_err(|e| {
                StorageError::InvalidInput(format!("body of `{}` is not valid base64: {e}", self.file_name))
            })
    }
}

/// Write `file` to `bucket`, retrying according to `policy`.
///
/// The body is decoded once up front; a malformed body is rejected without
/// touching the backend. When every attempt fails, the error wraps the cause
/// of the last attempt.
pub async fn upload(
    backend: &dyn StorageBackend,
    bucket: &str,
    file: &UploadFile,
    policy: &RetryPolicy,
    call_timeout: Option<Duration>,
) -> StorageResult<PutAck> {
    if bucket.is_empty() || file.file_name.is_empty() {
        return Err(StorageError::InvalidInput(
            "upload requires a bucket and a file name".to_string(),
        ));
    }
    let data = file.decode()?;
    let key = file.file_name.as_str();
    debug!(bucket, key, bytes = data.len(), attempts = policy.max_attempts, "uploading");

    let ack = with_retry(policy, "PutObject", || {
        timed("PutObject", call_timeout, backend.put_object(bucket, key, data.clone()))
    })
    .await
    .map_err(|exhausted| {
        let attempts = exhausted.attempts;
        StorageError::classify(exhausted.last_error, |source| StorageError::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            attempts,
            source,
        })
    })?;

    info!(bucket, key, e_tag = ?ack.e_tag, "upload complete");
    Ok(ack)
}
