// tests/test_signed_url.rs
//
// Presigned URL generation and raw listing pass-through.

mod common;

use std::time::Duration;

use common::{seed_numbered, storage_over, BUCKET};
use s3files::{MemoryBackend, SignMethod, SignedUrlRequest, StorageError};

#[tokio::test]
async fn test_signed_url_defaults_to_one_hour() {
    let backend = MemoryBackend::new();
    let storage = storage_over(&backend);

    let url = storage
        .get_signed_url(&SignedUrlRequest::new(BUCKET, "docs/a.pdf"))
        .await
        .unwrap();

    assert!(url.contains("expires=3600"), "{url}");
    let signed = backend.signed_requests();
    assert_eq!(signed.len(), 1);
    assert_eq!(signed[0].1, Duration::from_secs(3600));
}

#[tokio::test]
async fn test_signed_url_uses_explicit_expiration_and_mime_type() {
    let backend = MemoryBackend::new();
    let storage = storage_over(&backend);

    let request = SignedUrlRequest::new(BUCKET, "docs/a.pdf")
        .with_expiration_secs(90)
        .with_mime_type("application/pdf")
        .with_method(SignMethod::Put);
    let url = storage.get_signed_url(&request).await.unwrap();

    assert!(url.starts_with("memory://test-bucket/docs/a.pdf?method=PUT"), "{url}");
    assert!(url.contains("content-type=application/pdf"));
    let signed = backend.signed_requests();
    assert_eq!(signed[0].0, request);
    assert_eq!(signed[0].1, Duration::from_secs(90));
}

#[tokio::test]
async fn test_signing_failure_is_sign_error() {
    let backend = MemoryBackend::new();
    backend.fail_sign("expired credentials");
    let storage = storage_over(&backend);

    let err = storage
        .get_signed_url(&SignedUrlRequest::new(BUCKET, "k"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Sign { .. }));
    assert_eq!(err.envelope().exception_code, "BAD_REQUEST");
}

#[tokio::test]
async fn test_raw_listing_exposes_pagination() {
    let backend = MemoryBackend::new().with_page_size(4);
    seed_numbered(&backend, 6);
    let storage = storage_over(&backend);

    let first = storage.list_objects(BUCKET, "data/").await.unwrap();
    assert_eq!(first.objects.len(), 4);
    assert!(first.is_truncated);

    let token = first.next_continuation_token.as_deref();
    let second = storage.list_objects_page(BUCKET, "data/", token).await.unwrap();
    assert_eq!(second.objects.len(), 2);
    assert!(second.next_continuation_token.is_none());
}

#[tokio::test]
async fn test_raw_listing_of_missing_bucket_fails() {
    let backend = MemoryBackend::new();
    let storage = storage_over(&backend);

    let err = storage.list_objects("nope", "").await.unwrap_err();
    assert_eq!(err.code(), "STORAGE_LIST_ERROR");
}
