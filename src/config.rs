// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Client configuration.
//!
//! Precedence for every connection setting: values set explicitly on
//! [`StorageConfig`] win, then `AWS_*` environment variables (a `.env` file is
//! loaded first), then the SDK default provider chain. The region finally
//! falls back to [`DEFAULT_REGION`].

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_REGION, ENV_CALL_TIMEOUT_SECS, ENV_CONCURRENCY_LIMIT,
};
use crate::retry::RetryPolicy;

/// Connection settings for the S3 backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, LocalStack).
    pub endpoint_url: Option<String>,
    /// Use `endpoint/bucket` addressing. Forced on whenever `endpoint_url` is set.
    pub force_path_style: bool,
    pub connect_timeout: Option<Duration>,
    /// SDK-level timeout for a whole operation, including its own retries.
    pub operation_timeout: Option<Duration>,
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config populated from the process environment (and `.env`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default().merged_with_env(|name| env::var(name).ok())
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self.session_token = session_token;
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Fill every unset field from `lookup`, which maps an environment
    /// variable name to its value. Explicit values are never overwritten.
    pub fn merged_with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if self.region.is_none() {
            self.region = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION"));
        }
        // Credentials only count as a pair.
        if self.access_key_id.is_none() && self.secret_access_key.is_none() {
            if let (Some(id), Some(secret)) = (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
                self.access_key_id = Some(id);
                self.secret_access_key = Some(secret);
                if self.session_token.is_none() {
                    self.session_token = get("AWS_SESSION_TOKEN");
                }
            }
        }
        if self.endpoint_url.is_none() {
            self.endpoint_url = get("AWS_ENDPOINT_URL");
        }
        self
    }

    /// Explicit static credentials, if both halves are present.
    pub fn static_credentials(&self) -> Option<(&str, &str, Option<&str>)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => {
                Some((id.as_str(), secret.as_str(), self.session_token.as_deref()))
            }
            _ => None,
        }
    }

    pub fn uses_path_style(&self) -> bool {
        self.force_path_style || self.endpoint_url.is_some()
    }

    pub fn effective_connect_timeout(&self) -> Duration {
        self.connect_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    /// The region that will be used when nothing upstream provides one.
    pub fn fallback_region() -> &'static str {
        DEFAULT_REGION
    }
}

/// Behaviour knobs for the high-level [`crate::storage::FileStorage`] facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    /// Objects fetched concurrently per batch. Must be at least 1.
    pub concurrency_limit: usize,
    /// Keep zero-length objects in bulk results instead of dropping them.
    pub include_empty_objects: bool,
    /// Budget for each individual backend call; `None` waits forever.
    pub call_timeout: Option<Duration>,
    pub upload_retry: RetryPolicy,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            include_empty_objects: false,
            call_timeout: Some(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)),
            upload_retry: RetryPolicy::default(),
        }
    }
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by `S3FILES_CONCURRENCY_LIMIT` and
    /// `S3FILES_CALL_TIMEOUT_SECS` when they parse.
    pub fn from_env() -> Self {
        Self::default().merged_with_env(|name| env::var(name).ok())
    }

    pub fn merged_with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(limit) = lookup(ENV_CONCURRENCY_LIMIT)
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|l| *l > 0)
        {
            self.concurrency_limit = limit;
        }
        if let Some(secs) = lookup(ENV_CALL_TIMEOUT_SECS).and_then(|s| s.parse::<u64>().ok()) {
            // 0 disables the per-call timeout
            self.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_empty_objects(mut self, include: bool) -> Self {
        self.include_empty_objects = include;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.upload_retry = policy;
        self
    }
}
