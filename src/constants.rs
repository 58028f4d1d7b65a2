// src/constants.rs
//
// Centralized constants for s3files to avoid hardcoded values throughout the codebase

/// Region used when neither the config, the environment nor the SDK chain provide one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default number of objects fetched concurrently per batch
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 25;

/// Default lifetime of a presigned URL (seconds)
pub const DEFAULT_URL_EXPIRATION_SECS: u64 = 3600;

/// Default number of write attempts for a single upload
pub const DEFAULT_UPLOAD_ATTEMPTS: u32 = 3;

/// Default per-call timeout for storage operations (seconds)
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Default SDK connect timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Initial delay of the exponential upload retry policy (milliseconds)
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Upper bound of the exponential upload retry policy (milliseconds)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

/// Environment override for the per-call timeout
pub const ENV_CALL_TIMEOUT_SECS: &str = "S3FILES_CALL_TIMEOUT_SECS";

/// Environment override for the fetch concurrency limit
pub const ENV_CONCURRENCY_LIMIT: &str = "S3FILES_CONCURRENCY_LIMIT";
