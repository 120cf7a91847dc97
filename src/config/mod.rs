use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::storage::types::MIN_PART_SIZE;

/// Object storage connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL (default: GCS XML API)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HMAC access key
    pub access_key: String,

    /// HMAC secret
    pub secret_key: String,

    /// Signing region (default: auto)
    #[serde(default = "default_region")]
    pub region: String,

    /// Upload part size in bytes; values below 5 MiB are raised to 5 MiB
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_part_size() -> usize {
    8 * 1024 * 1024
}

impl StorageConfig {
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            endpoint: default_endpoint(),
            access_key,
            secret_key,
            region: default_region(),
            part_size: default_part_size(),
            insecure_tls: false,
        }
    }

    pub fn effective_part_size(&self) -> usize {
        self.part_size.max(MIN_PART_SIZE)
    }
}

/// FTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    /// Port used when the request host carries none
    #[serde(default = "default_ftp_port")]
    pub port: u16,

    /// Password sent for anonymous logins
    #[serde(default = "default_anonymous_password")]
    pub anonymous_password: String,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_anonymous_password() -> String {
    "anonymous@".to_string()
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            port: default_ftp_port(),
            anonymous_password: default_anonymous_password(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080)
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,

    #[serde(default)]
    pub ftp: FtpConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ftp: FtpConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

/// Load configuration from environment variables
///
/// - STORAGE_ACCESS_KEY / AWS_ACCESS_KEY_ID
/// - STORAGE_SECRET_KEY / AWS_SECRET_ACCESS_KEY
/// - STORAGE_ENDPOINT (optional, defaults to https://storage.googleapis.com)
/// - STORAGE_REGION (optional, defaults to auto)
/// - STORAGE_PART_SIZE (optional, bytes)
/// - STORAGE_INSECURE_TLS (optional, true/1)
/// - FTP_PORT (optional, defaults to 21)
/// - FTP_ANONYMOUS_PASSWORD (optional)
/// - LISTEN (optional, defaults to 0.0.0.0:8080)
pub fn load_from_env() -> Result<Config> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let access_key = std::env::var("STORAGE_ACCESS_KEY")
        .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
        .context("Neither STORAGE_ACCESS_KEY nor AWS_ACCESS_KEY_ID environment variable is set")?;

    let secret_key = std::env::var("STORAGE_SECRET_KEY")
        .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
        .context(
            "Neither STORAGE_SECRET_KEY nor AWS_SECRET_ACCESS_KEY environment variable is set",
        )?;

    let mut config = Config::new(StorageConfig::new(access_key, secret_key));

    if let Ok(endpoint) = std::env::var("STORAGE_ENDPOINT") {
        config.storage.endpoint = endpoint;
    }
    if let Ok(region) = std::env::var("STORAGE_REGION") {
        config.storage.region = region;
    }
    if let Some(part_size) = parse_env("STORAGE_PART_SIZE")? {
        config.storage.part_size = part_size;
    }
    if let Ok(insecure) = std::env::var("STORAGE_INSECURE_TLS") {
        config.storage.insecure_tls = insecure == "true" || insecure == "1";
    }

    if let Some(port) = parse_env("FTP_PORT")? {
        config.ftp.port = port;
    }
    if let Ok(password) = std::env::var("FTP_ANONYMOUS_PASSWORD") {
        config.ftp.anonymous_password = password;
    }

    if let Ok(listen) = std::env::var("LISTEN") {
        config.server.listen = listen;
    }

    Ok(config)
}

/// Load configuration from a YAML file when one is given, otherwise from
/// the environment.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
