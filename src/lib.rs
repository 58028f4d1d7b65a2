// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root — public re-exports.

// ===== Core Public API =====
pub mod storage;

pub use storage::FileStorage;

// ===== Building blocks =====
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod list;
pub mod retry;
pub mod signer;
pub mod upload;
pub mod uri;

// ===== Backends =====
pub mod s3_client;
pub mod memory_backend;

pub use backend::{ListPage, ObjectBody, ObjectDescriptor, PutAck, StorageBackend};
pub use config::{StorageConfig, StorageOptions};
pub use error::{ErrorEnvelope, StorageError, StorageResult};
pub use fetch::{FetchFailure, FetchOptions, FetchReport, RetrievedFile};
pub use memory_backend::MemoryBackend;
pub use retry::RetryPolicy;
pub use s3_client::S3Backend;
pub use signer::{SignMethod, SignedUrlRequest};
pub use upload::UploadFile;
pub use uri::{parse_object_uri, parse_s3_uri};
