// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! AWS SDK implementation of [`StorageBackend`].
//!
//! The client is built from an explicit [`StorageConfig`]; anything the config
//! leaves unset is resolved by the SDK's own provider chains.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

use crate::backend::{ListPage, ObjectBody, ObjectDescriptor, PutAck, StorageBackend};
use crate::config::StorageConfig;
use crate::constants::DEFAULT_REGION;
use crate::signer::{SignMethod, SignedUrlRequest};

const CREDENTIALS_PROVIDER_NAME: &str = "s3files";

// -----------------------------------------------------------------------------
// Client factory
// -----------------------------------------------------------------------------

/// Build an S3 client from `config`.
pub async fn build_s3_client(config: &StorageConfig) -> Result<Client> {
    let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    match config.static_credentials() {
        Some((id, secret, token)) => {
            debug!("Using explicit static credentials");
            let credentials = Credentials::new(
                id,
                secret,
                token.map(str::to_string),
                None,
                CREDENTIALS_PROVIDER_NAME,
            );
            loader = loader.credentials_provider(credentials);
        }
        None => debug!("No explicit credentials, using the SDK default chain"),
    }

    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let mut timeouts = TimeoutConfig::builder().connect_timeout(config.effective_connect_timeout());
    if let Some(operation_timeout) = config.operation_timeout {
        timeouts = timeouts.operation_timeout(operation_timeout);
    }

    let cfg = loader.timeout_config(timeouts.build()).load().await;

    // S3-compatible services behind a custom endpoint need endpoint/bucket addressing.
    let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
        .force_path_style(config.uses_path_style())
        .build();
    Ok(Client::from_conf(s3_config))
}

/// Render an SDK failure with the service error code so retry
/// classification can see it.
fn sdk_error<E, R>(operation: &str, bucket: &str, key: &str, err: SdkError<E, R>) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let detail = match err.code() {
        Some(code) => format!("{code}: {}", err.message().unwrap_or("no message")),
        None => DisplayErrorContext(&err).to_string(),
    };
    anyhow::Error::new(err).context(format!("{operation} s3://{bucket}/{key} failed: {detail}"))
}

// -----------------------------------------------------------------------------
// Backend
// -----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        Ok(Self::from_client(build_s3_client(config).await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<PutAck> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", bucket, key, e))?;

        Ok(PutAck {
            e_tag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("GetObject", bucket, key, e))?;

        let body = futures::stream::unfold(output.body, |mut body| async move {
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), body)),
                Some(Err(e)) => Some((Err(anyhow::Error::new(e).context("reading object body")), body)),
                None => None,
            }
        });
        Ok(body.boxed())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = continuation_token {
            req = req.continuation_token(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", bucket, prefix, e))?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|k| ObjectDescriptor {
                    bucket: bucket.to_string(),
                    key: k.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    e_tag: obj.e_tag().map(str::to_string),
                })
            })
            .collect();

        Ok(ListPage {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            objects,
            next_continuation_token: resp.next_continuation_token().map(str::to_string),
            is_truncated: resp.is_truncated().unwrap_or(false),
        })
    }

    async fn sign(&self, request: &SignedUrlRequest, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .with_context(|| format!("Invalid presigned URL lifetime {expires_in:?}"))?;
        let (bucket, key) = (request.bucket.as_str(), request.route.as_str());

        let presigned = match request.method {
            SignMethod::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .set_response_content_type(request.mime_type.clone())
                .presigned(presigning)
                .await
                .map_err(|e| sdk_error("PresignGetObject", bucket, key, e))?,
            SignMethod::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .set_content_type(request.mime_type.clone())
                .presigned(presigning)
                .await
                .map_err(|e| sdk_error("PresignPutObject", bucket, key, e))?,
        };
        Ok(presigned.uri().to_string())
    }
}
