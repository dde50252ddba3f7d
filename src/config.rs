use std::env;

use sha2::{Digest, Sha256};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// S3 / MinIO connection settings for the blob store.
#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Process-wide settings. Built once at start-up and shared read-only through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: String,
    pub site_password: String,
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Public URL prefix under which stored blobs are served; `<img src>` values under it are
    /// treated as owned by the post that embeds them.
    pub blob_public_url: String,
    pub cors_origins: Vec<String>,
    pub s3: S3Config,
}

pub const MIN_API_KEY_LEN: usize = 16;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        if api_key.len() < MIN_API_KEY_LEN {
            return Err(ConfigError::Invalid {
                name: "API_KEY",
                reason: format!("must be at least {MIN_API_KEY_LEN} characters"),
            });
        }
        let site_password = non_empty("SITE_PASSWORD").ok_or(ConfigError::Missing("SITE_PASSWORD"))?;

        let db_max_connections = match non_empty("DB_MAX_CONNECTIONS") {
            Some(v) => v.parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                reason: e.to_string(),
            })?,
            None => 5,
        };

        let blob_public_url = non_empty("BLOB_PUBLIC_URL")
            .unwrap_or_else(|| "http://localhost:8080/blobs".into())
            .trim_end_matches('/')
            .to_string();

        let cors_origins = non_empty("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            api_key,
            site_password,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            database_url: non_empty("DATABASE_URL"),
            db_max_connections,
            blob_public_url,
            cors_origins,
            s3: S3Config {
                endpoint: non_empty("S3_ENDPOINT"),
                bucket: non_empty("S3_BUCKET").unwrap_or_else(|| "anonboard-blobs".into()),
                region: non_empty("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                access_key: lookup("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: lookup("S3_SECRET_KEY").unwrap_or_default(),
            },
        })
    }

    pub fn site_password_matches(&self, presented: &str) -> bool {
        secrets_match(&self.site_password, presented)
    }
}

// Comparing fixed-size digests keeps the comparison length independent of the input.
pub(crate) fn secrets_match(expected: &str, presented: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(presented.as_bytes())
}
