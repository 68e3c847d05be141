use crate::playback::{AfterSeek, PlayerConfig};
use crate::recordings::S3Config;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Remote processing API
pub const REMOTE_API_URL: &str = "https://acr-3-148163978225.asia-northeast2.run.app";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("{0} is not set")]
    Missing(&'static str),
}

#[derive(Clone, Debug, Default)]
pub struct FirebaseConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
}

/// Application configuration
/// In debug builds: loads .env first, then reads the environment
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the processing API (the local proxy in debug builds)
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub proxy_port: u16,
    /// Where the local proxy forwards `/api/*`
    pub proxy_target: String,
    pub firebase: FirebaseConfig,
    /// Serve audio from an S3-compatible store instead of Firebase Storage
    pub s3: Option<S3Config>,
    pub audio_load_timeout: Duration,
    pub audio_settle_delay: Duration,
    pub slider_seek_policy: AfterSeek,
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            } else {
                debug!("Config: No .env file found, using the environment only");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default_base_url = if cfg!(debug_assertions) {
            "http://localhost:3001/api"
        } else {
            REMOTE_API_URL
        };

        let s3 = match get("ACR_S3_BUCKET") {
            Some(bucket_name) => {
                let config = S3Config {
                    bucket_name,
                    region: get("ACR_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    access_key_id: get("ACR_S3_ACCESS_KEY_ID")
                        .ok_or(ConfigError::Missing("ACR_S3_ACCESS_KEY_ID"))?,
                    secret_access_key: get("ACR_S3_SECRET_ACCESS_KEY")
                        .ok_or(ConfigError::Missing("ACR_S3_SECRET_ACCESS_KEY"))?,
                    endpoint_url: get("ACR_S3_ENDPOINT_URL"),
                };
                config.validate().map_err(|e| ConfigError::Invalid {
                    key: "ACR_S3_*",
                    message: e.to_string(),
                })?;
                Some(config)
            }
            None => None,
        };

        let slider_seek_policy = match get("ACR_SLIDER_SEEK_POLICY") {
            Some(raw) => raw.parse::<AfterSeek>().map_err(|message| ConfigError::Invalid {
                key: "ACR_SLIDER_SEEK_POLICY",
                message,
            })?,
            None => AfterSeek::default(),
        };

        let config = Self {
            api_base_url: get("ACR_API_BASE_URL").unwrap_or_else(|| default_base_url.to_string()),
            request_timeout: Duration::from_secs(number(&get, "ACR_REQUEST_TIMEOUT_SECS", 60)?),
            poll_interval: Duration::from_secs(number(&get, "ACR_POLL_INTERVAL_SECS", 5)?),
            proxy_port: number(&get, "ACR_PROXY_PORT", 3001)?,
            proxy_target: get("ACR_PROXY_TARGET").unwrap_or_else(|| REMOTE_API_URL.to_string()),
            firebase: FirebaseConfig {
                api_key: get("FIREBASE_API_KEY"),
                project_id: get("FIREBASE_PROJECT_ID"),
                storage_bucket: get("FIREBASE_STORAGE_BUCKET"),
            },
            s3,
            audio_load_timeout: Duration::from_secs(number(
                &get,
                "ACR_AUDIO_LOAD_TIMEOUT_SECS",
                30,
            )?),
            audio_settle_delay: Duration::from_millis(number(&get, "ACR_AUDIO_SETTLE_MILLIS", 100)?),
            slider_seek_policy,
        };

        debug!("Config: processing API at {}", config.api_base_url);
        Ok(config)
    }

    /// Player settings handed to each controller
    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            load_timeout: self.audio_load_timeout,
            settle_delay: self.audio_settle_delay,
            after_seek: self.slider_seek_policy,
            ..PlayerConfig::default()
        }
    }

    pub fn require_project_id(&self) -> Result<&str, ConfigError> {
        self.firebase
            .project_id
            .as_deref()
            .ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))
    }
}

fn number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}
