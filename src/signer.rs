// src/signer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Presigned URL generation.

use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{timed, StorageBackend};
use crate::constants::DEFAULT_URL_EXPIRATION_SECS;
use crate::error::{StorageError, StorageResult};

/// Which request the signed URL authorises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignMethod {
    /// Download the object.
    #[default]
    Get,
    /// Upload a new body for the object.
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlRequest {
    pub bucket: String,
    /// Object key the URL points at.
    pub route: String,
    /// Response content type for `Get`, required upload content type for `Put`.
    pub mime_type: Option<String>,
    /// Lifetime of the URL; [`DEFAULT_URL_EXPIRATION_SECS`] when unset.
    pub expiration_secs: Option<u64>,
    pub method: SignMethod,
}

impl SignedUrlRequest {
    pub fn new(bucket: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            route: route.into(),
            mime_type: None,
            expiration_secs: None,
            method: SignMethod::Get,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_expiration_secs(mut self, secs: u64) -> Self {
        self.expiration_secs = Some(secs);
        self
    }

    pub fn with_method(mut self, method: SignMethod) -> Self {
        self.method = method;
        self
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs.unwrap_or(DEFAULT_URL_EXPIRATION_SECS))
    }
}

/// Sign `request` with a single backend call. Signing is never retried.
pub async fn get_signed_url(
    backend: &dyn StorageBackend,
    request: &SignedUrlRequest,
    call_timeout: Option<Duration>,
) -> StorageResult<String> {
    if request.bucket.is_empty() || request.route.is_empty() {
        return Err(StorageError::InvalidInput(
            "signing requires a bucket and an object route".to_string(),
        ));
    }

    let expires_in = request.expiration();
    debug!(
        bucket = %request.bucket,
        key = %request.route,
        method = ?request.method,
        expires_secs = expires_in.as_secs(),
        "signing URL"
    );

    timed("SignUrl", call_timeout, backend.sign(request, expires_in))
        .await
        .map_err(|cause| {
            warn!(bucket = %request.bucket, key = %request.route, error = %format!("{cause:#}"), "signing failed");
            StorageError::classify(cause, |source| StorageError::Sign {
                bucket: request.bucket.clone(),
                key: request.route.clone(),
                source,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_expiration_is_one_hour() {
        let req = SignedUrlRequest::new("b", "k");
        assert_eq!(req.expiration(), Duration::from_secs(3600));
        assert_eq!(req.method, SignMethod::Get);
    }

    #[test]
    fn test_explicit_expiration_is_kept() {
        let req = SignedUrlRequest::new("b", "k").with_expiration_secs(42);
        assert_eq!(req.expiration(), Duration::from_secs(42));
    }
}
