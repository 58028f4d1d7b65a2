// src/memory_backend.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! In-process storage backend.
//!
//! Keeps buckets in memory, paginates listings like S3 does and can be told to
//! fail or stall specific calls. Used by the test suite and for dry runs of
//! code built on [`crate::storage::FileStorage`] without network access.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::backend::{ListPage, ObjectBody, ObjectDescriptor, PutAck, StorageBackend};
use crate::signer::{SignMethod, SignedUrlRequest};

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Default)]
struct State {
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    list_failure: Option<String>,
    get_failures: HashMap<String, String>,
    body_failures: HashMap<String, String>,
    stalled_gets: Vec<String>,
    /// Number of upcoming puts to fail, with the message of each failure.
    put_failures: Vec<String>,
    sign_failure: Option<String>,
    get_log: Vec<String>,
    signed: Vec<(SignedUrlRequest, Duration)>,
    list_calls: usize,
    put_calls: usize,
}

/// Thread-safe in-memory object store.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    page_size: usize,
    chunk_size: usize,
    get_delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when a GET fails, is cancelled, or its
/// body is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Object body that keeps its GET counted as in flight until dropped.
struct TrackedBody {
    inner: ObjectBody,
    _guard: InFlight,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            get_delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Maximum keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Size of the chunks object bodies are streamed in.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Artificial latency added to every GET.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state().buckets.entry(bucket.to_string()).or_default();
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.state()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state().buckets.get(bucket)?.get(key).cloned()
    }

    /// Make every listing call fail with `message`.
    pub fn fail_list(&self, message: &str) {
        self.state().list_failure = Some(message.to_string());
    }

    /// Make the GET of `key` fail before any body is returned.
    pub fn fail_get(&self, key: &str, message: &str) {
        self.state().get_failures.insert(key.to_string(), message.to_string());
    }

    /// Make the body stream of `key` fail after its first chunk.
    pub fn fail_body(&self, key: &str, message: &str) {
        self.state().body_failures.insert(key.to_string(), message.to_string());
    }

    /// Make the GET of `key` never complete.
    pub fn stall_get(&self, key: &str) {
        self.state().stalled_gets.push(key.to_string());
    }

    /// Fail the next `messages.len()` puts, in order, with the given messages.
    pub fn fail_puts<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().put_failures.extend(messages.into_iter().map(Into::into));
    }

    pub fn fail_sign(&self, message: &str) {
        self.state().sign_failure = Some(message.to_string());
    }

    /// Keys requested through `get_object`, in request order.
    pub fn get_log(&self) -> Vec<String> {
        self.state().get_log.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn put_calls(&self) -> usize {
        self.state().put_calls
    }

    /// Requests passed to `sign`, with the expiration each one was signed for.
    pub fn signed_requests(&self) -> Vec<(SignedUrlRequest, Duration)> {
        self.state().signed.clone()
    }

    /// Highest number of GETs observed open at the same time. A GET stays open
    /// from the request until its body stream is dropped.
    pub fn max_in_flight_gets(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<PutAck> {
        let mut state = self.state();
        state.put_calls += 1;
        if !state.put_failures.is_empty() {
            let message = state.put_failures.remove(0);
            bail!("PutObject s3://{bucket}/{key} failed: {message}");
        }
        let e_tag = format!("\"{:x}-{}\"", state.put_calls, data.len());
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        Ok(PutAck {
            e_tag: Some(e_tag),
            version_id: None,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self.in_flight.clone());

        let stalled = {
            let mut state = self.state();
            state.get_log.push(key.to_string());
            state.stalled_gets.iter().any(|k| k == key)
        };
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if stalled {
            std::future::pending::<()>().await;
        }

        let (data, body_failure) = {
            let state = self.state();
            if let Some(message) = state.get_failures.get(key) {
                bail!("GetObject s3://{bucket}/{key} failed: {message}");
            }
            let data = state
                .buckets
                .get(bucket)
                .ok_or_else(|| anyhow!("GetObject s3://{bucket}/{key} failed: NoSuchBucket"))?
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow!("GetObject s3://{bucket}/{key} failed: NoSuchKey"))?;
            (data, state.body_failures.get(key).cloned())
        };

        let mut chunks: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.chunk_size).min(data.len());
            chunks.push(Ok(data.slice(offset..end)));
            offset = end;
        }
        if let Some(message) = body_failure {
            chunks.truncate(1);
            chunks.push(Err(anyhow!("body stream for {key} broke: {message}")));
        }
        Ok(TrackedBody {
            inner: futures::stream::iter(chunks).boxed(),
            _guard: guard,
        }
        .boxed())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut state = self.state();
        state.list_calls += 1;
        if let Some(message) = &state.list_failure {
            bail!("ListObjectsV2 s3://{bucket}/{prefix} failed: {message}");
        }
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("ListObjectsV2 s3://{bucket}/{prefix} failed: NoSuchBucket"))?;

        let mut matching = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| continuation_token.is_none_or(|t| k.as_str() > t));

        let page: Vec<ObjectDescriptor> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(k, v)| ObjectDescriptor {
                bucket: bucket.to_string(),
                key: k.clone(),
                size: v.len() as u64,
                e_tag: None,
            })
            .collect();
        let is_truncated = matching.next().is_some();
        let next_continuation_token = if is_truncated {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            objects: page,
            next_continuation_token,
            is_truncated,
        })
    }

    async fn sign(&self, request: &SignedUrlRequest, expires_in: Duration) -> Result<String> {
        let mut state = self.state();
        if let Some(message) = &state.sign_failure {
            bail!("presign s3://{}/{} failed: {message}", request.bucket, request.route);
        }
        state.signed.push((request.clone(), expires_in));

        let method = match request.method {
            SignMethod::Get => "GET",
            SignMethod::Put => "PUT",
        };
        let mut url = format!(
            "memory://{}/{}?method={method}&expires={}",
            request.bucket,
            request.route,
            expires_in.as_secs()
        );
        if let Some(mime) = &request.mime_type {
            url.push_str("&content-type=");
            url.push_str(mime);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_bodies_count_as_in_flight() {
        let backend = MemoryBackend::new();
        backend.insert("b", "x", b"1".to_vec());
        backend.insert("b", "y", b"2".to_vec());

        let first = backend.get_object("b", "x").await.unwrap();
        let second = backend.get_object("b", "y").await.unwrap();
        assert_eq!(backend.max_in_flight_gets(), 2);
        drop(first);
        drop(second);

        let body = backend.get_object("b", "x").await.unwrap();
        let _: Vec<_> = body.collect().await;
        let _ = backend.get_object("b", "y").await.unwrap();
        assert_eq!(backend.max_in_flight_gets(), 2);
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip_in_chunks() {
        let backend = MemoryBackend::new().with_chunk_size(2);
        backend
            .put_object("b", "k", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let chunks: Vec<_> = backend.get_object("b", "k").await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(backend.get_log(), ["k"]);
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let backend = MemoryBackend::new();
        backend.create_bucket("b");
        let err = backend.get_object("b", "nope").await.err().unwrap();
        assert!(err.to_string().contains("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_put_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.fail_puts(["first"]);
        assert!(backend.put_object("b", "k", Bytes::new()).await.is_err());
        assert!(backend.put_object("b", "k", Bytes::new()).await.is_ok());
        assert_eq!(backend.put_calls(), 2);
    }
}
