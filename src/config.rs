use std::{env, path::PathBuf};

use dotenvy::dotenv;
use thiserror::Error;
use validator::Validate;

use crate::{
    storage::{LocalSettings, S3Settings, StorageSettings, s3::wasabi_service_url},
    utils::{ensure_https_prefix, trimmed},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Validate)]
pub struct Config {
    pub port: u16,
    /// Enables per-tenant settings when present.
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 104857600))] // Max 100MB
    pub max_file_size: u64,
    pub storage: StorageSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load environment variables from `.env` file (if it exists)
        dotenv().ok();

        let api_base_url = var_or("API_BASE_URL", "http://localhost:3000");
        let desktop_user_path = if flag("IS_DESKTOP") {
            let path = var("USER_DATA_PATH").ok_or(ConfigError::Missing("USER_DATA_PATH"))?;
            Some(PathBuf::from(path))
        } else {
            None
        };
        let public_path = PathBuf::from(var_or("PUBLIC_PATH", "./public"));

        let storage = StorageSettings {
            default_provider: var_or("FILE_PROVIDER", "local"),
            local: LocalSettings::for_deployment(
                &api_base_url,
                desktop_user_path.as_deref(),
                &public_path,
            ),
            s3: S3Settings {
                root_path: String::new(),
                access_key_id: var_or("AWS_ACCESS_KEY_ID", ""),
                secret_access_key: var_or("AWS_SECRET_ACCESS_KEY", ""),
                region: var_or("AWS_REGION", "us-east-1"),
                bucket: var_or("AWS_S3_BUCKET", "gauzy"),
                endpoint: var("S3_ENDPOINT").map(|url| ensure_https_prefix(&url)),
                force_path_style: flag("AWS_S3_FORCE_PATH_STYLE"),
            },
            wasabi: wasabi_from_env(),
            digitalocean: S3Settings {
                root_path: String::new(),
                access_key_id: var_or("DIGITALOCEAN_ACCESS_KEY_ID", ""),
                secret_access_key: var_or("DIGITALOCEAN_SECRET_ACCESS_KEY", ""),
                region: var_or("DIGITALOCEAN_REGION", "us-east-1"),
                bucket: var_or("DIGITALOCEAN_S3_BUCKET", "gauzy"),
                endpoint: var("DIGITALOCEAN_SERVICE_URL").map(|url| ensure_https_prefix(&url)),
                force_path_style: flag("DIGITALOCEAN_S3_FORCE_PATH_STYLE"),
            },
            object_prefix: var_or("S3_OBJECT_PREFIX", "gauzy"),
        };

        let config = Config {
            port: parse_or("PORT", 3000)?,
            database_url: var("DATABASE_URL"),
            max_file_size: parse_or("MAX_FILE_SIZE", 10_485_760)?,
            storage,
        };

        // Validate configuration values (e.g. file size range)
        config.validate()?;
        Ok(config)
    }
}

/// Wasabi endpoint: explicit service URL, else the region's endpoint.
fn wasabi_from_env() -> S3Settings {
    let region = var_or("WASABI_REGION", "us-east-1");
    let endpoint = var("WASABI_SERVICE_URL")
        .map(|url| ensure_https_prefix(&url))
        .or_else(|| wasabi_service_url(&region).map(str::to_string))
        .unwrap_or_else(|| "https://s3.wasabisys.com".to_string());

    S3Settings {
        root_path: String::new(),
        access_key_id: var_or("WASABI_ACCESS_KEY_ID", ""),
        secret_access_key: var_or("WASABI_SECRET_ACCESS_KEY", ""),
        region,
        bucket: var_or("WASABI_S3_BUCKET", "gauzy"),
        endpoint: Some(endpoint),
        force_path_style: flag("WASABI_S3_FORCE_PATH_STYLE"),
    }
}

/// Non-blank value of an environment variable.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().as_deref().and_then(trimmed).map(str::to_string)
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn flag(key: &str) -> bool {
    matches!(var(key).as_deref(), Some("true") | Some("1"))
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
