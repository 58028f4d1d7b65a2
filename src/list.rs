// src/list.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Object enumeration.
//!
//! [`list_page`] is a raw pass-through for one backend page. [`list_all`]
//! follows continuation tokens until the backend reports the listing is
//! complete, so buckets larger than one page are enumerated in full.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{timed, ListPage, ObjectDescriptor, StorageBackend};
use crate::error::{StorageError, StorageResult};

fn list_error(bucket: &str, prefix: &str, cause: anyhow::Error) -> StorageError {
    warn!(bucket, prefix, error = %format!("{cause:#}"), "listing failed");
    StorageError::classify(cause, |source| StorageError::List {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        source,
    })
}

fn check_bucket(bucket: &str) -> StorageResult<()> {
    if bucket.is_empty() {
        return Err(StorageError::InvalidInput("bucket name must not be empty".to_string()));
    }
    Ok(())
}

/// Fetch a single listing page without retrying.
pub async fn list_page(
    backend: &dyn StorageBackend,
    bucket: &str,
    prefix: &str,
    continuation_token: Option<&str>,
    call_timeout: Option<Duration>,
) -> StorageResult<ListPage> {
    check_bucket(bucket)?;
    timed(
        "ListObjects",
        call_timeout,
        backend.list_objects(bucket, prefix, continuation_token),
    )
    .await
    .map_err(|cause| list_error(bucket, prefix, cause))
}

/// List every object under `prefix`, in backend order, across all pages.
pub async fn list_all(
    backend: &dyn StorageBackend,
    bucket: &str,
    prefix: &str,
    call_timeout: Option<Duration>,
) -> StorageResult<Vec<ObjectDescriptor>> {
    check_bucket(bucket)?;

    let mut objects = Vec::new();
    let mut cont: Option<String> = None;
    let mut seen_tokens: HashSet<String> = HashSet::new();
    let mut pages = 0usize;
    loop {
        let page = list_page(backend, bucket, prefix, cont.as_deref(), call_timeout).await?;
        pages += 1;
        objects.extend(page.objects);

        match page.next_continuation_token {
            Some(token) => {
                // any repeat means the backend is cycling
                if !seen_tokens.insert(token.clone()) {
                    return Err(list_error(
                        bucket,
                        prefix,
                        anyhow::anyhow!("backend returned continuation token `{token}` twice"),
                    ));
                }
                cont = Some(token);
            }
            None => break,
        }
    }

    debug!(bucket, prefix, pages, objects = objects.len(), "listing complete");
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use crate::backend::{ObjectBody, PutAck};
    use crate::signer::SignedUrlRequest;
    use anyhow::bail;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out one object per page with tokens taken from `tokens`, cycling.
    struct ScriptedTokens {
        tokens: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedTokens {
        fn new(tokens: Vec<&'static str>) -> Self {
            Self { tokens, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageBackend for ScriptedTokens {
        async fn put_object(&self, _bucket: &str, _key: &str, _data: Bytes) -> anyhow::Result<PutAck> {
            bail!("read-only")
        }

        async fn get_object(&self, _bucket: &str, _key: &str) -> anyhow::Result<ObjectBody> {
            bail!("read-only")
        }

        async fn list_objects(
            &self,
            bucket: &str,
            prefix: &str,
            _continuation_token: Option<&str>,
        ) -> anyhow::Result<ListPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= 50 {
                bail!("listing did not stop after {n} pages");
            }
            let token = self.tokens[n % self.tokens.len()];
            Ok(ListPage {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                objects: vec![ObjectDescriptor {
                    bucket: bucket.to_string(),
                    key: format!("k{n}"),
                    size: 1,
                    e_tag: None,
                }],
                next_continuation_token: Some(token.to_string()),
                is_truncated: true,
            })
        }

        async fn sign(&self, _request: &SignedUrlRequest, _expires_in: Duration) -> anyhow::Result<String> {
            bail!("read-only")
        }
    }

    #[tokio::test]
    async fn test_list_all_follows_pages() {
        let backend = MemoryBackend::new().with_page_size(2);
        for i in 0..5 {
            backend.insert("b", &format!("data/{i}.bin"), vec![1u8; 4]);
        }
        backend.insert("b", "other/x.bin", vec![1u8]);

        let objects = list_all(&backend, "b", "data/", None).await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["data/0.bin", "data/1.bin", "data/2.bin", "data/3.bin", "data/4.bin"]);
        assert_eq!(backend.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_all_empty_prefix_is_not_an_error() {
        let backend = MemoryBackend::new();
        backend.insert("b", "a.txt", b"hi".to_vec());
        let objects = list_all(&backend, "b", "nothing/", None).await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_list_page_is_raw() {
        let backend = MemoryBackend::new().with_page_size(1);
        backend.insert("b", "a", b"1".to_vec());
        backend.insert("b", "c", b"2".to_vec());

        let page = list_page(&backend, "b", "", None, None).await.unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.keys().collect::<Vec<_>>(), ["a"]);
        let token = page.next_continuation_token.clone().unwrap();

        let page = list_page(&backend, "b", "", Some(&token), None).await.unwrap();
        assert!(!page.is_truncated);
        assert_eq!(page.keys().collect::<Vec<_>>(), ["c"]);
        assert!(page.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_list_failure_is_list_error() {
        let backend = MemoryBackend::new();
        backend.fail_list("AccessDenied: listing forbidden");
        let err = list_all(&backend, "b", "", None).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_LIST_ERROR");
        assert!(format!("{:#}", err.cause().unwrap()).contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_empty_bucket_name_rejected() {
        let backend = MemoryBackend::new();
        let err = list_all(&backend, "", "", None).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(backend.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_token_stops_listing() {
        let backend = ScriptedTokens::new(vec!["A"]);
        let err = list_all(&backend, "b", "", None).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_LIST_ERROR");
        assert!(format!("{:#}", err.cause().unwrap()).contains("`A` twice"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_alternating_tokens_stop_listing() {
        let backend = ScriptedTokens::new(vec!["A", "B"]);
        let err = list_all(&backend, "b", "", None).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_LIST_ERROR");
        assert!(format!("{:#}", err.cause().unwrap()).contains("`A` twice"));
        assert_eq!(backend.calls(), 3);
    }
}
