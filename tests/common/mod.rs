// tests/common/mod.rs
//
// Common test utilities for the storage facade tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use s3files::{FileStorage, MemoryBackend, StorageOptions};

pub const BUCKET: &str = "test-bucket";

/// Storage over `backend` with default options and a short call timeout.
pub fn storage_over(backend: &MemoryBackend) -> FileStorage {
    storage_with(backend, StorageOptions::default())
}

pub fn storage_with(backend: &MemoryBackend, options: StorageOptions) -> FileStorage {
    FileStorage::with_backend(Arc::new(backend.clone()), options)
}

pub fn short_timeout() -> Option<Duration> {
    Some(Duration::from_millis(100))
}

/// Key for the `i`-th object of a numbered data set, sorted like its index.
pub fn numbered_key(i: usize) -> String {
    format!("data/obj-{i:03}.bin")
}

/// Seed `count` numbered objects, each holding its own key as content.
pub fn seed_numbered(backend: &MemoryBackend, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let key = numbered_key(i);
            backend.insert(BUCKET, &key, key.clone().into_bytes());
            key
        })
        .collect()
}
