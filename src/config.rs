use std::env;

/// Tag for the identifier-digest algorithm this server accepts. Handshakes or
/// `room:join` frames carrying a different tag are rejected.
pub const HASH_VERSION: &str = "sha256-hex-v1";

/// Server protocol version (semver). Major must match the client's.
pub const SERVER_PROTOCOL_VERSION: &str = "2.0.0";
/// Lowest client protocol version this server still accepts.
pub const MIN_CLIENT_PROTOCOL_VERSION: &str = "2.0.0";

pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DISPLAY_NAME_MAX_LENGTH: usize = 64;
pub const EMOJI_MAX_LENGTH: usize = 16;
pub const FILE_PATH_MAX_LENGTH: usize = 512;

pub const PRESENCE_TTL_SECONDS: i64 = 15;
pub const COALESCE_INTERVAL_MS: u64 = 200;
pub const PRESENCE_SWEEP_INTERVAL_SECS: u64 = 5;
pub const RETENTION_SWEEP_INTERVAL_SECS: u64 = 15 * 60;

/// Server configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub port: u16,
    pub retention_days: i64,
    pub database_path: String,
    pub hash_version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LINEHEAT_TOKEN must be set to a non-empty shared bearer token")]
    MissingToken,
}

impl Config {
    /// Load configuration from the environment. Fails only when the shared
    /// bearer token is missing or empty — every other variable has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("LINEHEAT_TOKEN").unwrap_or_default();
        if token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let port = env::var("LINEHEAT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let retention_days = env::var("LINEHEAT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        let database_path = env::var("LINEHEAT_DATABASE_PATH")
            .unwrap_or_else(|_| "data/lineheat.db".to_string());

        let hash_version =
            env::var("LINEHEAT_HASH_VERSION").unwrap_or_else(|_| HASH_VERSION.to_string());

        Ok(Config {
            token,
            port,
            retention_days,
            database_path,
            hash_version,
        })
    }
}
