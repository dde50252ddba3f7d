use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::S3Config;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed object storage for uploaded images and attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError>;
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError>;
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
}

/// `images/ab/abcdef…` for images, `files/ab/abcdef…` for everything else.
pub fn key_for(hash: &str, mime: &str) -> String {
    let prefix = if mime.starts_with("image/") { "images" } else { "files" };
    let shard = hash.get(0..2).unwrap_or("00");
    format!("{prefix}/{shard}/{hash}")
}

pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Inverse of [`public_url`]: the key of a url served from `base`, if it is one of ours.
pub fn key_from_url<'a>(base: &str, url: &'a str) -> Option<&'a str> {
    let base = base.trim_end_matches('/');
    let rest = url.strip_prefix(base)?.strip_prefix('/')?;
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    is_valid_key(rest).then_some(rest)
}

/// Keys are `<images|files>/<shard>/<hash>` with no traversal segments.
pub fn is_valid_key(key: &str) -> bool {
    let mut parts = key.split('/');
    let (Some(prefix), Some(shard), Some(name), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    matches!(prefix, "images" | "files")
        && shard.len() == 2
        && !name.is_empty()
        && [shard, name].iter().all(|p| p.chars().all(|c| c.is_ascii_alphanumeric()))
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3BlobStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        use anyhow::Context;
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = cfg.endpoint.clone().context("S3_ENDPOINT must be set")?;
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(endpoint);
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(cfg.access_key.clone(), cfg.secret_key.clone(), None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        // path-style: MinIO and local endpoints have no wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&loader.load().await)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);

        ensure_bucket(&client, &cfg.bucket).await?;
        info!(bucket = %cfg.bucket, "blob store ready");
        Ok(Self { bucket: cfg.bucket.clone(), client })
    }
}

const BUCKET_ATTEMPTS: u32 = 5;

/// Creates `bucket` when it is missing, retrying while the endpoint comes up.
async fn ensure_bucket(client: &aws_sdk_s3::Client, bucket: &str) -> anyhow::Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }
    let mut attempt = 1;
    loop {
        match client.create_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) if attempt >= BUCKET_ATTEMPTS => {
                return Err(anyhow::anyhow!("cannot create bucket '{bucket}': {e}"));
            }
            Err(e) => {
                warn!(bucket, attempt, "create_bucket failed, retrying: {e}");
                tokio::time::sleep(std::time::Duration::from_millis(500 * u64::from(attempt))).await;
                attempt += 1;
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        if self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .is_ok()
        {
            return Err(BlobStoreError::Duplicate);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(BlobStoreError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| BlobStoreError::NotFound)?;
        let stored_type = obj.content_type().map(str::to_string);
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| BlobStoreError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = stored_type
            .or_else(|| infer::get(&bytes).map(|t| t.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobStoreError::Other(e.to_string()))
    }
}

pub async fn build_blob_store(cfg: &S3Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(S3BlobStore::new(cfg).await?))
}
