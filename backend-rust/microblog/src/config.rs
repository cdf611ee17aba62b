use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite file path; `:memory:` keeps everything in memory
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Empty means any origin is allowed
    pub allowed_origins: Vec<String>,
    pub max_age: usize,
}

/// Service configuration, read once at start-up and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreConfig,
    pub media: MediaConfig,
    pub cors: CorsConfig,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load from the process environment, after applying an optional `.env` file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8069)?,
            store: StoreConfig {
                path: lookup("DATABASE_PATH").unwrap_or_else(|| "microblog.db".to_string()),
            },
            media: MediaConfig {
                dir: lookup("MEDIA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("static/medias")),
            },
            cors: CorsConfig {
                allowed_origins,
                max_age: parse_or(&lookup, "CORS_MAX_AGE", 3600)?,
            },
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
