// src/uri.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! `s3://bucket/key` helpers.

use anyhow::{bail, Context, Result};

/// Split `s3://bucket/key` → (`bucket`, `key`). `key` may be empty (prefix).
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let trimmed = uri
        .strip_prefix("s3://")
        .context("URI must start with s3://")?;
    let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        bail!("URI has no bucket: {uri}");
    }
    Ok((bucket.to_owned(), key.to_owned()))
}

/// Like [`parse_s3_uri`], but the key must name an object.
pub fn parse_object_uri(uri: &str) -> Result<(String, String)> {
    let (bucket, key) = parse_s3_uri(uri)?;
    if key.is_empty() || key.ends_with('/') {
        bail!("URI has no object key: {uri}");
    }
    Ok((bucket, key))
}
