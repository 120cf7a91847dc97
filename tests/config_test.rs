use std::env;
use std::fs;
use tempfile::TempDir;

use ftp_import::config::{load_config, load_from_env, load_from_yaml};

const ENV_VARS: &[&str] = &[
    "STORAGE_ACCESS_KEY",
    "STORAGE_SECRET_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "STORAGE_ENDPOINT",
    "STORAGE_REGION",
    "STORAGE_PART_SIZE",
    "STORAGE_INSECURE_TLS",
    "FTP_PORT",
    "FTP_ANONYMOUS_PASSWORD",
    "LISTEN",
];

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
storage:
  endpoint: https://minio.internal:9000
  access_key: GOOGTEST
  secret_key: secrettest
  region: us-west-2
  part_size: 16777216
  insecure_tls: true

ftp:
  port: 2121
  anonymous_password: ops@example.com

server:
  listen: "127.0.0.1:9000"
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = load_from_yaml(&config_path).unwrap();

    assert_eq!(config.storage.endpoint, "https://minio.internal:9000");
    assert_eq!(config.storage.access_key, "GOOGTEST");
    assert_eq!(config.storage.secret_key, "secrettest");
    assert_eq!(config.storage.region, "us-west-2");
    assert_eq!(config.storage.part_size, 16 * 1024 * 1024);
    assert!(config.storage.insecure_tls);

    assert_eq!(config.ftp.port, 2121);
    assert_eq!(config.ftp.anonymous_password, "ops@example.com");
    assert_eq!(config.server.listen, "127.0.0.1:9000");
}

/// Test default values
#[test]
fn test_default_values() {
    let yaml = r#"
storage:
  access_key: key
  secret_key: secret
  part_size: 1024
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = load_config(Some(config_path.to_str().unwrap())).unwrap();

    assert_eq!(config.storage.endpoint, "https://storage.googleapis.com");
    assert_eq!(config.storage.region, "auto");
    assert!(!config.storage.insecure_tls);
    // Parts below the storage minimum are raised to it
    assert_eq!(config.storage.effective_part_size(), 5 * 1024 * 1024);

    assert_eq!(config.ftp.port, 21);
    assert_eq!(config.ftp.anonymous_password, "anonymous@");
    assert_eq!(config.server.listen, "0.0.0.0:8080");
}

#[test]
fn test_missing_file_and_bad_yaml() {
    assert!(load_from_yaml("/nonexistent/config.yaml").is_err());

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "ftp:\n  port: 21\n").unwrap();
    // Credentials are required
    assert!(load_from_yaml(&config_path).is_err());
}

/// Environment loading. One test, since the process environment is shared
/// between test threads.
#[test]
fn test_load_env_config() {
    let saved: Vec<_> = ENV_VARS.iter().map(|k| (*k, env::var(k).ok())).collect();
    for key in ENV_VARS {
        env::remove_var(key);
    }

    // No credentials at all
    assert!(load_from_env().is_err());

    // AWS standard names with defaults for everything else
    env::set_var("AWS_ACCESS_KEY_ID", "aws_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "aws_secret");
    let config = load_from_env().unwrap();
    assert_eq!(config.storage.access_key, "aws_key");
    assert_eq!(config.storage.secret_key, "aws_secret");
    assert_eq!(config.storage.endpoint, "https://storage.googleapis.com");
    assert_eq!(config.ftp.port, 21);

    // Storage names win over the AWS ones
    env::set_var("STORAGE_ACCESS_KEY", "hmac_key");
    env::set_var("STORAGE_SECRET_KEY", "hmac_secret");
    env::set_var("STORAGE_ENDPOINT", "http://127.0.0.1:9000");
    env::set_var("STORAGE_REGION", "eu-west-1");
    env::set_var("STORAGE_PART_SIZE", "10485760");
    env::set_var("STORAGE_INSECURE_TLS", "1");
    env::set_var("FTP_PORT", "2121");
    env::set_var("FTP_ANONYMOUS_PASSWORD", "guest@");
    env::set_var("LISTEN", "127.0.0.1:8081");
    let config = load_config(None).unwrap();
    assert_eq!(config.storage.access_key, "hmac_key");
    assert_eq!(config.storage.secret_key, "hmac_secret");
    assert_eq!(config.storage.endpoint, "http://127.0.0.1:9000");
    assert_eq!(config.storage.region, "eu-west-1");
    assert_eq!(config.storage.part_size, 10 * 1024 * 1024);
    assert!(config.storage.insecure_tls);
    assert_eq!(config.ftp.port, 2121);
    assert_eq!(config.ftp.anonymous_password, "guest@");
    assert_eq!(config.server.listen, "127.0.0.1:8081");

    // Unparseable numbers are reported, not ignored
    env::set_var("FTP_PORT", "ftp");
    let err = load_from_env().unwrap_err();
    assert!(err.to_string().contains("FTP_PORT"));

    for (key, value) in saved {
        cleanup_env(key, value);
    }
}

/// Helper function to cleanup environment variables
fn cleanup_env(key: &str, orig_val: Option<String>) {
    match orig_val {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}
