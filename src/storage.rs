// src/storage.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! High-level file storage facade.
//!
//! [`FileStorage`] owns a backend plus [`StorageOptions`] and exposes the
//! caller-facing operations: upload, bulk download, presigned URLs and raw
//! listing. Every operation returns one [`StorageError`] on failure.

use std::sync::Arc;
use tracing::info;

use crate::backend::{ListPage, ObjectDescriptor, PutAck, StorageBackend};
use crate::config::{StorageConfig, StorageOptions};
use crate::error::{StorageError, StorageResult};
use crate::fetch::{fetch_all, fetch_all_settled, FetchOptions, FetchReport, RetrievedFile};
use crate::list::{list_all, list_page};
use crate::s3_client::S3Backend;
use crate::signer::{get_signed_url, SignedUrlRequest};
use crate::upload::{upload, UploadFile};

#[derive(Clone)]
pub struct FileStorage {
    backend: Arc<dyn StorageBackend>,
    options: StorageOptions,
}

impl FileStorage {
    /// Use an already constructed backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>, options: StorageOptions) -> Self {
        Self { backend, options }
    }

    /// Connect to S3 with `config`.
    pub async fn connect(config: &StorageConfig, options: StorageOptions) -> StorageResult<Self> {
        let backend = S3Backend::connect(config)
            .await
            .map_err(|e| StorageError::Config(format!("{e:#}")))?;
        Ok(Self::with_backend(Arc::new(backend), options))
    }

    /// Connect to S3 using configuration and options from the environment.
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&StorageConfig::from_env(), StorageOptions::from_env()).await
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    fn fetch_options(&self, concurrency_limit: usize) -> FetchOptions {
        FetchOptions {
            concurrency_limit,
            include_empty_objects: self.options.include_empty_objects,
            call_timeout: self.options.call_timeout,
        }
    }

    /// Upload one file, retrying with the configured upload policy.
    pub async fn upload_file(&self, bucket: &str, file: &UploadFile) -> StorageResult<PutAck> {
        upload(
            self.backend(),
            bucket,
            file,
            &self.options.upload_retry,
            self.options.call_timeout,
        )
        .await
    }

    /// Every object under `prefix` that is not filtered out as empty.
    pub async fn get_files(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<RetrievedFile>> {
        self.get_files_with_limit(bucket, prefix, self.options.concurrency_limit)
            .await
    }

    /// [`Self::get_files`] with an explicit concurrency limit.
    pub async fn get_files_with_limit(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        concurrency_limit: usize,
    ) -> StorageResult<Vec<RetrievedFile>> {
        let prefix = prefix.unwrap_or("");
        let descriptors = self.list_all(bucket, prefix).await?;
        let files = fetch_all(
            self.backend(),
            bucket,
            &descriptors,
            &self.fetch_options(concurrency_limit),
        )
        .await?;
        info!(bucket, prefix, listed = descriptors.len(), fetched = files.len(), "files retrieved");
        Ok(files)
    }

    /// Like [`Self::get_files`], but keeps going past failed objects and
    /// reports them alongside the successful ones.
    pub async fn get_files_settled(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<FetchReport> {
        let prefix = prefix.unwrap_or("");
        let descriptors = self.list_all(bucket, prefix).await?;
        fetch_all_settled(
            self.backend(),
            bucket,
            &descriptors,
            &self.fetch_options(self.options.concurrency_limit),
        )
        .await
    }

    /// Every object descriptor under `prefix`, across all listing pages.
    pub async fn list_all(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectDescriptor>> {
        list_all(self.backend(), bucket, prefix, self.options.call_timeout).await
    }

    pub async fn get_signed_url(&self, request: &SignedUrlRequest) -> StorageResult<String> {
        get_signed_url(self.backend(), request, self.options.call_timeout).await
    }

    /// First raw listing page under `prefix`.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<ListPage> {
        self.list_objects_page(bucket, prefix, None).await
    }

    /// Raw listing page starting at `continuation_token`.
    pub async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        list_page(
            self.backend(),
            bucket,
            prefix,
            continuation_token,
            self.options.call_timeout,
        )
        .await
    }
}
