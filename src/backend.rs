// src/backend.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Pluggable storage backend abstraction.
//!
//! The pipeline only needs four capabilities from a provider: write one
//! object, stream one object back, list one page of keys and sign a request.
//! [`crate::s3_client::S3Backend`] implements them with the AWS SDK and
//! [`crate::memory_backend::MemoryBackend`] implements them in-process.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;
use std::time::Duration;

use crate::error::CallTimedOut;
use crate::signer::SignedUrlRequest;

/// Streamed object content as delivered by the backend.
pub type ObjectBody = BoxStream<'static, Result<Bytes>>;

/// One stored object, as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub e_tag: Option<String>,
}

/// A single page of a listing call, with the backend's pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub bucket: String,
    pub prefix: String,
    pub objects: Vec<ObjectDescriptor>,
    /// Cursor for the next page; `None` once the listing is complete.
    pub next_continuation_token: Option<String>,
    pub is_truncated: bool,
}

impl ListPage {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }
}

/// Backend acknowledgement of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutAck {
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write `data` as the full content of `bucket/key`.
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<PutAck>;

    /// Open the content stream of `bucket/key`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    /// Fetch one listing page. `continuation_token` is the cursor returned by
    /// the previous page, or `None` for the first one.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage>;

    /// Produce a URL granting temporary access described by `request`.
    async fn sign(&self, request: &SignedUrlRequest, expires_in: Duration) -> Result<String>;
}

/// Run `fut` under an optional per-call time budget.
///
/// Expiry yields a [`CallTimedOut`] error so boundaries can report it as a
/// distinct failure kind.
pub async fn timed<T, F>(operation: &str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(res) => res,
            Err(_) => Err(CallTimedOut {
                operation: operation.to_string(),
                after,
            }
            .into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timed_passes_through_without_limit() {
        let v = timed("noop", None, async { Ok::<_, anyhow::Error>(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn test_timed_reports_call_timeout() {
        let res: Result<()> = timed("GetObject", Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = res.unwrap_err();
        let t = err.downcast_ref::<CallTimedOut>().expect("timeout error");
        assert_eq!(t.operation, "GetObject");
        assert_eq!(t.after, Duration::from_millis(20));
    }
}
