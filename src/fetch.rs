// src/fetch.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Batched bulk download.
//!
//! Descriptors are split into contiguous batches of at most
//! `concurrency_limit` objects. Batches run one after another; the fetches
//! inside a batch are joined concurrently on the calling task, so at most
//! `concurrency_limit` bodies are open against the backend at once.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use futures::future::{join_all, try_join_all};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::backend::{timed, ObjectBody, ObjectDescriptor, StorageBackend};
use crate::constants::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CONCURRENCY_LIMIT};
use crate::error::{StorageError, StorageResult};

/// One downloaded object with its content as standard base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedFile {
    pub key: String,
    pub body: String,
}

impl RetrievedFile {
    /// Decode the base64 body back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub concurrency_limit: usize,
    pub include_empty_objects: bool,
    pub call_timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            include_empty_objects: false,
            call_timeout: Some(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)),
        }
    }
}

/// A per-object failure recorded by [`fetch_all_settled`].
#[derive(Debug)]
pub struct FetchFailure {
    pub key: String,
    pub error: StorageError,
}

/// Outcome of a fetch that runs every batch regardless of failures.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub files: Vec<RetrievedFile>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn the report into the fail-fast shape: the files, or the first failure.
    pub fn into_result(self) -> StorageResult<Vec<RetrievedFile>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.files),
        }
    }
}

/// Split `items` into contiguous batches of at most `limit` elements.
///
/// Yields `ceil(len / limit)` batches; only the last one may be shorter.
pub fn partition<T>(items: &[T], limit: usize) -> StorageResult<std::slice::Chunks<'_, T>> {
    if limit == 0 {
        return Err(StorageError::InvalidInput(
            "concurrency limit must be at least 1".to_string(),
        ));
    }
    Ok(items.chunks(limit))
}

/// Drain `body` completely and encode the bytes as base64 text.
pub async fn materialize(mut body: ObjectBody) -> anyhow::Result<String> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(STANDARD.encode(&buf))
}

/// Fetch and materialize one object. `Ok(None)` means the object was empty
/// and empty objects are not wanted.
async fn fetch_one(
    backend: &dyn StorageBackend,
    bucket: &str,
    key: &str,
    options: &FetchOptions,
) -> StorageResult<Option<RetrievedFile>> {
    let body = timed("GetObject", options.call_timeout, async {
        let stream = backend.get_object(bucket, key).await?;
        materialize(stream).await
    })
    .await
    .map_err(|cause| {
        warn!(bucket, key, error = %format!("{cause:#}"), "object fetch failed");
        StorageError::classify(cause, |source| StorageError::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
    })?;

    if body.is_empty() && !options.include_empty_objects {
        trace!(bucket, key, "dropping empty object");
        return Ok(None);
    }
    Ok(Some(RetrievedFile {
        key: key.to_string(),
        body,
    }))
}

/// Fetch every descriptor, fail-fast.
///
/// The first failing fetch aborts the whole call: the rest of its batch is
/// cancelled, no later batch is started and no partial result is returned.
/// Results follow descriptor order.
pub async fn fetch_all(
    backend: &dyn StorageBackend,
    bucket: &str,
    descriptors: &[ObjectDescriptor],
    options: &FetchOptions,
) -> StorageResult<Vec<RetrievedFile>> {
    let batches = partition(descriptors, options.concurrency_limit)?;
    let mut files = Vec::with_capacity(descriptors.len());

    for (index, batch) in batches.enumerate() {
        debug!(bucket, batch = index, size = batch.len(), "fetching batch");
        let fetched = try_join_all(
            batch
                .iter()
                .map(|d| fetch_one(backend, bucket, &d.key, options)),
        )
        .await?;
        files.extend(fetched.into_iter().flatten());
    }

    debug!(bucket, requested = descriptors.len(), returned = files.len(), "fetch complete");
    Ok(files)
}

/// Fetch every descriptor, recording failures instead of aborting.
///
/// Every batch runs to completion; each failed object contributes one
/// [`FetchFailure`] and the successful ones are kept.
pub async fn fetch_all_settled(
    backend: &dyn StorageBackend,
    bucket: &str,
    descriptors: &[ObjectDescriptor],
    options: &FetchOptions,
) -> StorageResult<FetchReport> {
    let batches = partition(descriptors, options.concurrency_limit)?;
    let mut report = FetchReport::default();

    for (index, batch) in batches.enumerate() {
        debug!(bucket, batch = index, size = batch.len(), "fetching batch");
        let outcomes = join_all(
            batch
                .iter()
                .map(|d| fetch_one(backend, bucket, &d.key, options)),
        )
        .await;

        for (descriptor, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(Some(file)) => report.files.push(file),
                Ok(None) => {}
                Err(error) => report.failures.push(FetchFailure {
                    key: descriptor.key.clone(),
                    error,
                }),
            }
        }
    }

    if !report.is_complete() {
        warn!(bucket, failed = report.failures.len(), fetched = report.files.len(), "fetch finished with failures");
    }
    Ok(report)
}
