//! Configuration module for BoothMail.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BOOTHMAIL_WATCH_DIR` | For `run` | - | Directory the booth writes photos into |
//! | `BOOTHMAIL_OUTPUT_DIR` | For captures | - | Directory for session zip files |
//! | `BOOTHMAIL_ARCHIVE_DIR` | For captures | - | Root for unsent batch folders |
//! | `BOOTHMAIL_IDLE_SECS` | No | 20 | Idle window before a session is sent |
//! | `BOOTHMAIL_SETTLE_MS` | No | 500 | Delay before touching a newly created file |
//! | `BOOTHMAIL_STABLE_WAIT_MS` | No | 5000 | Max extra wait for the file size to settle |
//! | `BOOTHMAIL_DELIVERY_TIMEOUT_SECS` | No | 60 | Bound on one delivery attempt |
//! | `BOOTHMAIL_EXTENSIONS` | No | `jpg,jpeg` | Comma-separated photo extensions |
//! | `BOOTHMAIL_TRANSPORT` | No | `smtp` | `smtp` or `api` |
//! | `BOOTHMAIL_SMTP_USER` | For `smtp` | - | SMTP account |
//! | `BOOTHMAIL_SMTP_PASSWORD` | For `smtp` | - | SMTP app password |
//! | `BOOTHMAIL_SMTP_HOST` | No | `smtp.gmail.com` | SMTP relay |
//! | `BOOTHMAIL_SMTP_PORT` | No | 587 | SMTP port |
//! | `BOOTHMAIL_SMTP_CONFIG` | No | `~/.boothmail/smtp_config.json` | JSON credentials file |
//! | `BOOTHMAIL_API_TOKEN` | For `api` | - | Bearer token |
//! | `BOOTHMAIL_API_TOKEN_FILE` | No | `~/.boothmail/token.json` | JSON file with a `token` field |
//! | `BOOTHMAIL_API_URL` | No | Gmail send endpoint | API endpoint |
//! | `BOOTHMAIL_FROM` | For `api` | SMTP user | Sender address |
//! | `BOOTHMAIL_SUBJECT` | No | built-in | Message subject |
//! | `BOOTHMAIL_BODY` | No | built-in | Message body |
//!
//! # Example
//!
//! ```no_run
//! use boothmail::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Transport: {}", config.transport.method());
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::delivery::MessageTemplate;
use crate::engine::DEFAULT_DELIVERY_TIMEOUT_SECS;
use crate::timer::DEFAULT_IDLE_SECS;
use crate::types::DeliveryMethod;
use crate::utils::settle::SettlePolicy;

/// Default settle delay in milliseconds.
const DEFAULT_SETTLE_MS: u64 = 500;

/// Default upper bound for the stability poll in milliseconds.
const DEFAULT_STABLE_WAIT_MS: u64 = 5000;

/// Default SMTP relay.
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Default SMTP submission port.
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default mail API endpoint.
pub const DEFAULT_API_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Config directory name relative to home.
const DEFAULT_CONFIG_DIR: &str = ".boothmail";

/// Default photo extensions accepted by the watcher.
const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A credentials file exists but could not be read.
    #[error("failed to read {}: {message}", .path.display())]
    CredentialsFile { path: PathBuf, message: String },
}

/// SMTP account settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
    pub from: String,
}

/// Settings for the token-authenticated mail API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub url: String,
    pub token: Zeroizing<String>,
    pub from: String,
}

/// Which transport delivers session archives.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    Api(ApiConfig),
}

impl TransportConfig {
    #[must_use]
    pub fn method(&self) -> DeliveryMethod {
        match self {
            Self::Smtp(_) => DeliveryMethod::Smtp,
            Self::Api(_) => DeliveryMethod::Api,
        }
    }
}

/// Configuration for BoothMail.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the booth software writes photos into.
    pub watch_dir: Option<PathBuf>,

    /// Directory where session zip files are written.
    pub output_dir: Option<PathBuf>,

    /// Root directory for unsent batch folders.
    pub archive_dir: Option<PathBuf>,

    /// Quiet period after the last capture before a session is sent.
    pub idle_window: Duration,

    /// How long to wait before touching a newly created file.
    pub settle: SettlePolicy,

    /// Upper bound for a single delivery attempt.
    pub delivery_timeout: Duration,

    /// Lower-cased file extensions treated as photos.
    pub extensions: Vec<String>,

    /// Subject and body of outgoing mail.
    pub template: MessageTemplate,

    /// Configured delivery transport.
    pub transport: TransportConfig,
}

/// On-disk SMTP credentials, as saved by earlier booth installs.
#[derive(Debug, Deserialize)]
struct SmtpCredentialsFile {
    email: Option<String>,
    password: Option<String>,
    server: Option<String>,
    port: Option<u16>,
}

/// On-disk API token file.
#[derive(Debug, Deserialize)]
struct TokenFile {
    token: Option<String>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric variable cannot be parsed or is zero where that is not allowed
    /// - `BOOTHMAIL_TRANSPORT` names an unknown transport
    /// - The selected transport lacks its credentials
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_dir = BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_CONFIG_DIR));

        let watch_dir = env_path("BOOTHMAIL_WATCH_DIR");
        let output_dir = env_path("BOOTHMAIL_OUTPUT_DIR");
        let archive_dir = env_path("BOOTHMAIL_ARCHIVE_DIR");

        let idle_secs = parse_positive("BOOTHMAIL_IDLE_SECS", DEFAULT_IDLE_SECS)?;
        let settle_ms = parse_u64("BOOTHMAIL_SETTLE_MS", DEFAULT_SETTLE_MS)?;
        let stable_wait_ms = parse_u64("BOOTHMAIL_STABLE_WAIT_MS", DEFAULT_STABLE_WAIT_MS)?;
        let timeout_secs = parse_positive(
            "BOOTHMAIL_DELIVERY_TIMEOUT_SECS",
            DEFAULT_DELIVERY_TIMEOUT_SECS,
        )?;

        let extensions = match env::var("BOOTHMAIL_EXTENSIONS") {
            Ok(val) => {
                let list: Vec<String> = val
                    .split(',')
                    .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if list.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "BOOTHMAIL_EXTENSIONS".to_string(),
                        message: "at least one extension is required".to_string(),
                    });
                }
                list
            }
            Err(_) => DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        };

        let mut template = MessageTemplate::default();
        if let Ok(subject) = env::var("BOOTHMAIL_SUBJECT") {
            template.subject = subject;
        }
        if let Ok(body) = env::var("BOOTHMAIL_BODY") {
            template.body = body;
        }

        let transport = match env::var("BOOTHMAIL_TRANSPORT")
            .unwrap_or_else(|_| "smtp".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "smtp" => TransportConfig::Smtp(smtp_from_env(config_dir.as_deref())?),
            "api" | "gmail" => TransportConfig::Api(api_from_env(config_dir.as_deref())?),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "BOOTHMAIL_TRANSPORT".to_string(),
                    message: format!("expected 'smtp' or 'api', got '{other}'"),
                })
            }
        };

        Ok(Self {
            watch_dir,
            output_dir,
            archive_dir,
            idle_window: Duration::from_secs(idle_secs),
            settle: SettlePolicy {
                delay: Duration::from_millis(settle_ms),
                max_wait: Duration::from_millis(stable_wait_ms),
                ..SettlePolicy::default()
            },
            delivery_timeout: Duration::from_secs(timeout_secs),
            extensions,
            template,
            transport,
        })
    }
}

/// The fallback-archive root from the environment, without loading the rest
/// of the configuration.
#[must_use]
pub fn archive_dir_from_env() -> Option<PathBuf> {
    env_path("BOOTHMAIL_ARCHIVE_DIR")
}

fn smtp_from_env(config_dir: Option<&Path>) -> Result<SmtpConfig, ConfigError> {
    let file_path = env_path("BOOTHMAIL_SMTP_CONFIG")
        .or_else(|| config_dir.map(|dir| dir.join("smtp_config.json")));
    let file = match &file_path {
        Some(path) if path.exists() => Some(read_json::<SmtpCredentialsFile>(path)?),
        _ => None,
    };

    let username = env::var("BOOTHMAIL_SMTP_USER")
        .ok()
        .or_else(|| file.as_ref().and_then(|f| f.email.clone()))
        .ok_or_else(|| ConfigError::MissingEnvVar("BOOTHMAIL_SMTP_USER".to_string()))?;
    let password = env::var("BOOTHMAIL_SMTP_PASSWORD")
        .ok()
        .or_else(|| file.as_ref().and_then(|f| f.password.clone()))
        .ok_or_else(|| ConfigError::MissingEnvVar("BOOTHMAIL_SMTP_PASSWORD".to_string()))?;

    let host = env::var("BOOTHMAIL_SMTP_HOST")
        .ok()
        .or_else(|| file.as_ref().and_then(|f| f.server.clone()))
        .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string());
    let port = match env::var("BOOTHMAIL_SMTP_PORT") {
        Ok(val) => val.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            key: "BOOTHMAIL_SMTP_PORT".to_string(),
            message: format!("expected port number, got '{val}'"),
        })?,
        Err(_) => file
            .as_ref()
            .and_then(|f| f.port)
            .unwrap_or(DEFAULT_SMTP_PORT),
    };

    let from = env::var("BOOTHMAIL_FROM").unwrap_or_else(|_| username.clone());

    Ok(SmtpConfig {
        host,
        port,
        username,
        password: Zeroizing::new(password),
        from,
    })
}

fn api_from_env(config_dir: Option<&Path>) -> Result<ApiConfig, ConfigError> {
    let token = match env::var("BOOTHMAIL_API_TOKEN") {
        Ok(token) => token,
        Err(_) => {
            let path = env_path("BOOTHMAIL_API_TOKEN_FILE")
                .or_else(|| config_dir.map(|dir| dir.join("token.json")))
                .filter(|path| path.exists())
                .ok_or_else(|| ConfigError::MissingEnvVar("BOOTHMAIL_API_TOKEN".to_string()))?;
            read_json::<TokenFile>(&path)?
                .token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ConfigError::CredentialsFile {
                    path,
                    message: "no 'token' field".to_string(),
                })?
        }
    };

    let from = env::var("BOOTHMAIL_FROM")
        .map_err(|_| ConfigError::MissingEnvVar("BOOTHMAIL_FROM".to_string()))?;
    let url = env::var("BOOTHMAIL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

    Ok(ApiConfig {
        url,
        token: Zeroizing::new(token),
        from,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::CredentialsFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::CredentialsFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected non-negative integer, got '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_u64(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to run tests with isolated environment variables.
    /// Clears all BOOTHMAIL_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("BOOTHMAIL_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        // Keep tests from picking up credential files in the real home directory.
        env::set_var("BOOTHMAIL_SMTP_CONFIG", "/nonexistent/smtp_config.json");
        env::set_var("BOOTHMAIL_API_TOKEN_FILE", "/nonexistent/token.json");

        let result = f();

        let current: Vec<String> = env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("BOOTHMAIL_"))
            .collect();
        for key in current {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    fn set_smtp_credentials() {
        env::set_var("BOOTHMAIL_SMTP_USER", "booth@gmail.com");
        env::set_var("BOOTHMAIL_SMTP_PASSWORD", "app-password");
    }

    #[test]
    #[serial]
    fn test_missing_smtp_credentials() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "BOOTHMAIL_SMTP_USER"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_smtp_config() {
        with_clean_env(|| {
            set_smtp_credentials();

            let config = Config::from_env().expect("should parse minimal config");

            assert!(config.watch_dir.is_none());
            assert!(config.output_dir.is_none());
            assert!(config.archive_dir.is_none());
            assert_eq!(config.idle_window, Duration::from_secs(DEFAULT_IDLE_SECS));
            assert_eq!(config.settle.delay, Duration::from_millis(DEFAULT_SETTLE_MS));
            assert_eq!(config.extensions, vec!["jpg", "jpeg"]);

            match config.transport {
                TransportConfig::Smtp(smtp) => {
                    assert_eq!(smtp.host, DEFAULT_SMTP_HOST);
                    assert_eq!(smtp.port, DEFAULT_SMTP_PORT);
                    assert_eq!(smtp.from, "booth@gmail.com");
                    assert_eq!(smtp.password.as_str(), "app-password");
                }
                TransportConfig::Api(_) => panic!("expected SMTP transport"),
            }
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            set_smtp_credentials();
            env::set_var("BOOTHMAIL_WATCH_DIR", "/booth/incoming");
            env::set_var("BOOTHMAIL_OUTPUT_DIR", "/booth/zips");
            env::set_var("BOOTHMAIL_ARCHIVE_DIR", "/booth/unsent");
            env::set_var("BOOTHMAIL_IDLE_SECS", "45");
            env::set_var("BOOTHMAIL_SETTLE_MS", "0");
            env::set_var("BOOTHMAIL_DELIVERY_TIMEOUT_SECS", "10");
            env::set_var("BOOTHMAIL_EXTENSIONS", " JPG , .png ");
            env::set_var("BOOTHMAIL_SUBJECT", "Hello");
            env::set_var("BOOTHMAIL_SMTP_PORT", "465");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.watch_dir, Some(PathBuf::from("/booth/incoming")));
            assert_eq!(config.output_dir, Some(PathBuf::from("/booth/zips")));
            assert_eq!(config.archive_dir, Some(PathBuf::from("/booth/unsent")));
            assert_eq!(config.idle_window, Duration::from_secs(45));
            assert_eq!(config.settle.delay, Duration::ZERO);
            assert_eq!(config.delivery_timeout, Duration::from_secs(10));
            assert_eq!(config.extensions, vec!["jpg", "png"]);
            assert_eq!(config.template.subject, "Hello");
            assert!(matches!(config.transport, TransportConfig::Smtp(ref s) if s.port == 465));
        });
    }

    #[test]
    #[serial]
    fn test_zero_idle_window_rejected() {
        with_clean_env(|| {
            set_smtp_credentials();
            env::set_var("BOOTHMAIL_IDLE_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "BOOTHMAIL_IDLE_SECS" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_unknown_transport_rejected() {
        with_clean_env(|| {
            env::set_var("BOOTHMAIL_TRANSPORT", "pigeon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "BOOTHMAIL_TRANSPORT"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_api_transport_requires_sender() {
        with_clean_env(|| {
            env::set_var("BOOTHMAIL_TRANSPORT", "api");
            env::set_var("BOOTHMAIL_API_TOKEN", "ya29.token");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "BOOTHMAIL_FROM"));

            env::set_var("BOOTHMAIL_FROM", "booth@example.com");
            let config = Config::from_env().expect("should parse api config");
            assert_eq!(config.transport.method(), DeliveryMethod::Api);
            match config.transport {
                TransportConfig::Api(api) => {
                    assert_eq!(api.url, DEFAULT_API_URL);
                    assert_eq!(api.token.as_str(), "ya29.token");
                }
                TransportConfig::Smtp(_) => panic!("expected API transport"),
            }
        });
    }

    #[test]
    #[serial]
    fn test_smtp_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smtp_config.json");
        fs::write(
            &path,
            r#"{"email":"file@gmail.com","password":"secret","server":"smtp.example.com","port":2525}"#,
        )
        .unwrap();

        with_clean_env(|| {
            env::set_var("BOOTHMAIL_SMTP_CONFIG", &path);

            let config = Config::from_env().expect("should read credentials file");
            match config.transport {
                TransportConfig::Smtp(smtp) => {
                    assert_eq!(smtp.username, "file@gmail.com");
                    assert_eq!(smtp.password.as_str(), "secret");
                    assert_eq!(smtp.host, "smtp.example.com");
                    assert_eq!(smtp.port, 2525);
                }
                TransportConfig::Api(_) => panic!("expected SMTP transport"),
            }
        });
    }

    #[test]
    #[serial]
    fn test_api_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"token":"from-file","refresh_token":"r"}"#).unwrap();

        with_clean_env(|| {
            env::set_var("BOOTHMAIL_TRANSPORT", "api");
            env::set_var("BOOTHMAIL_FROM", "booth@example.com");
            env::set_var("BOOTHMAIL_API_TOKEN_FILE", &path);

            let config = Config::from_env().expect("should read token file");
            assert!(matches!(
                config.transport,
                TransportConfig::Api(ref api) if api.token.as_str() == "from-file"
            ));
        });
    }
}
