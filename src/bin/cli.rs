//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `upload`, `get`, `sign` and `ls`.
//!
//! Examples:
//! ```bash
//! s3files-cli upload  ./report.pdf s3://bucket/docs/report.pdf
//! s3files-cli get     s3://bucket/docs/ -j 25 --out ./docs
//! s3files-cli sign    s3://bucket/docs/report.pdf --expires 15m --mime-type application/pdf
//! s3files-cli ls      s3://bucket/docs/
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s3files::{
    parse_object_uri, parse_s3_uri, FileStorage, RetrievedFile, RetryPolicy, SignMethod,
    SignedUrlRequest, StorageConfig, StorageOptions, UploadFile,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

// --- S3Path lets clap parse "s3://bucket/key" directly.
#[derive(Clone, Debug)]
struct S3Path {
    bucket: String,
    key: String,
}

impl FromStr for S3Path {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, key) = parse_s3_uri(s)?;
        Ok(S3Path { bucket, key })
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// AWS region (overrides AWS_REGION).
    #[arg(long, global = true)]
    region: Option<String>,

    /// Custom S3-compatible endpoint (overrides AWS_ENDPOINT_URL).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Per-call timeout, e.g. `30s` or `2m`. `0s` disables it.
    #[arg(long, global = true)]
    timeout: Option<humantime::Duration>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file to a single object.
    Upload {
        /// Local file to upload.
        src: PathBuf,

        /// Destination object URI (e.g. s3://bucket/key).
        dest: String,

        /// Total write attempts.
        #[arg(short = 'a', long = "attempts", default_value_t = 3)]
        attempts: u32,

        /// Back off exponentially between attempts and stop on terminal errors.
        #[arg(long)]
        backoff: bool,
    },

    /// Download every object under a prefix.
    Get {
        /// S3 URI prefix (e.g. s3://bucket/prefix/).
        #[clap(value_parser)]
        uri: S3Path,

        /// Objects fetched concurrently per batch.
        #[arg(short = 'j', long = "jobs", default_value_t = s3files::constants::DEFAULT_CONCURRENCY_LIMIT)]
        jobs: usize,

        /// Keep zero-length objects.
        #[arg(long)]
        include_empty: bool,

        /// Report failed objects instead of aborting on the first one.
        #[arg(long)]
        keep_going: bool,

        /// Write decoded objects below this directory instead of printing a summary.
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },

    /// Print a presigned URL for one object.
    Sign {
        /// Object URI (e.g. s3://bucket/key).
        uri: String,

        /// URL lifetime, e.g. `1h`, `15m`.
        #[arg(short = 'e', long = "expires", default_value = "1h")]
        expires: humantime::Duration,

        /// Content type to enforce (PUT) or to return (GET).
        #[arg(short = 'm', long = "mime-type")]
        mime_type: Option<String>,

        /// Sign an upload instead of a download.
        #[arg(long)]
        put: bool,
    },

    /// Print one raw listing page.
    Ls {
        /// S3 URI prefix (e.g. s3://bucket/prefix/).
        #[clap(value_parser)]
        uri: S3Path,

        /// Continuation token from a previous page.
        #[arg(long)]
        token: Option<String>,
    },
}

/// Join `key` below `root`, refusing keys that would escape it.
fn local_path_for(root: &Path, key: &str) -> Option<PathBuf> {
    let rel = Path::new(key);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(rel))
}

fn write_files(root: &Path, files: &[RetrievedFile]) -> Result<usize> {
    let mut written = 0;
    for file in files {
        let Some(path) = local_path_for(root, &file.key) else {
            warn!(key = %file.key, "skipping key that does not map to a local path");
            continue;
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let data = file
            .decode()
            .with_context(|| format!("Body of {} is not valid base64", file.key))?;
        std::fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn print_summary(files: &[RetrievedFile]) -> Result<()> {
    for file in files {
        // base64 length → decoded byte count
        let padding = file.body.bytes().rev().take_while(|b| *b == b'=').count();
        let bytes = file.body.len() / 4 * 3 - padding;
        safe_println!("{}\t{}", file.key, bytes);
    }
    Ok(())
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = StorageConfig::new();
    if let Some(region) = cli.region {
        config = config.with_region(region);
    }
    if let Some(endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    let config = config.merged_with_env(|name| std::env::var(name).ok());

    let mut options = StorageOptions::from_env();
    if let Some(timeout) = cli.timeout {
        let timeout: std::time::Duration = timeout.into();
        options = options.with_call_timeout((!timeout.is_zero()).then_some(timeout));
    }

    match cli.cmd {
        Command::Upload { src, dest, attempts, backoff } => {
            let (bucket, key) = parse_object_uri(&dest)?;
            let policy = if backoff {
                RetryPolicy::exponential(attempts)
            } else {
                RetryPolicy::flat(attempts)
            };
            let storage = FileStorage::connect(&config, options.with_upload_retry(policy)).await?;

            let file = UploadFile::from_path(key, &src)?;
            let ack = storage.upload_file(&bucket, &file).await?;
            info!("Uploaded {} to s3://{}/{}", src.display(), bucket, file.file_name);
            safe_println!("{}", ack.e_tag.unwrap_or_default());
        }

        Command::Get { uri, jobs, include_empty, keep_going, out } => {
            if jobs == 0 {
                bail!("--jobs must be at least 1");
            }
            let options = options
                .with_concurrency_limit(jobs)
                .with_empty_objects(include_empty);
            let storage = FileStorage::connect(&config, options).await?;
            let prefix = Some(uri.key.as_str());

            let (files, failed) = if keep_going {
                let report = storage.get_files_settled(&uri.bucket, prefix).await?;
                for failure in &report.failures {
                    eprintln!("FAILED {}: {}", failure.key, error_chain(&failure.error));
                }
                (report.files, report.failures.len())
            } else {
                (storage.get_files(&uri.bucket, prefix).await?, 0)
            };

            match out {
                Some(root) => {
                    let written = write_files(&root, &files)?;
                    info!("Wrote {} object(s) to {}", written, root.display());
                }
                None => print_summary(&files)?,
            }
            if failed > 0 {
                bail!("{failed} object(s) could not be fetched");
            }
        }

        Command::Sign { uri, expires, mime_type, put } => {
            let (bucket, key) = parse_object_uri(&uri)?;
            let storage = FileStorage::connect(&config, options).await?;
            let expires: std::time::Duration = expires.into();

            let mut request = SignedUrlRequest::new(bucket, key)
                .with_expiration_secs(expires.as_secs())
                .with_method(if put { SignMethod::Put } else { SignMethod::Get });
            if let Some(mime) = mime_type {
                request = request.with_mime_type(mime);
            }
            let url = storage.get_signed_url(&request).await?;
            safe_println!("{}", url);
        }

        Command::Ls { uri, token } => {
            let storage = FileStorage::connect(&config, options).await?;
            let page = storage
                .list_objects_page(&uri.bucket, &uri.key, token.as_deref())
                .await?;
            for obj in &page.objects {
                safe_println!("{}\t{}", obj.key, obj.size);
            }
            if let Some(next) = page.next_continuation_token {
                eprintln!("next token: {next}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_refuses_escapes() {
        let root = Path::new("/tmp/out");
        assert_eq!(local_path_for(root, "a/b.txt"), Some(PathBuf::from("/tmp/out/a/b.txt")));
        assert_eq!(local_path_for(root, "../etc/passwd"), None);
        assert_eq!(local_path_for(root, "/abs"), None);
    }

    #[test]
    fn test_write_files_decodes_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![RetrievedFile { key: "x/y.txt".into(), body: "aGk=".into() }];
        assert_eq!(write_files(dir.path(), &files).unwrap(), 1);
        assert_eq!(std::fs::read(dir.path().join("x/y.txt")).unwrap(), b"hi");
    }
}
