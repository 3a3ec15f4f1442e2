//! Application configuration parsed from environment variables.
//!
//! `from_env` reads the process environment; `from_lookup` takes any key
//! lookup so the parsing rules can be exercised without touching global state.

use std::path::PathBuf;

use time::UtcOffset;
use time::macros::format_description;

use crate::error::ErrorCode;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";
pub const DEFAULT_FIRESTORE_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FIRESTORE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_VIEWS: usize = crate::state::DEFAULT_MAX_VIEWS;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: String },
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub base_url: String,
    /// Read once at startup and never refreshed. Short-lived OAuth access
    /// tokens stop working when they expire (about an hour for Google), after
    /// which every call fails with status 401 until restart.
    pub bearer_token: Option<String>,
    pub timeouts: HttpTimeouts,
}

impl FirestoreConfig {
    /// Resource path of the documents root, e.g.
    /// `projects/p/databases/(default)/documents`.
    #[must_use]
    pub fn documents_path(&self) -> String {
        format!("projects/{}/databases/{}/documents", self.project_id, self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub seed_path: Option<PathBuf>,
}

/// Which backend serves the `reagents` and `histories` collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Firestore(FirestoreConfig),
    Postgres(PostgresConfig),
    Memory(MemoryConfig),
}

impl StoreConfig {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Firestore(_) => "firestore",
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub store: StoreConfig,
    /// Offset used when rendering record timestamps for people.
    /// Filtering always works on UTC days.
    pub display_offset: UtcOffset,
    /// Cap on open archive views; the least recently used one is evicted.
    pub max_views: usize,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PORT` (default 3000), `BIND_ADDR` (default `0.0.0.0`)
    /// - `ARCHIVE_STORE`: `firestore` (default), `postgres` or `memory`
    /// - `ARCHIVE_DISPLAY_UTC_OFFSET`: `+HH:MM`, default `+00:00`
    /// - `ARCHIVE_MAX_VIEWS`: open view cap, default 256
    ///
    /// Backend specific:
    /// - firestore: `FIRESTORE_PROJECT_ID` (required), `FIRESTORE_DATABASE`,
    ///   `FIRESTORE_BASE_URL`, `FIRESTORE_TOKEN_ENV` (names the env var holding
    ///   a bearer token), `FIRESTORE_REQUEST_TIMEOUT_SECS`,
    ///   `FIRESTORE_CONNECT_TIMEOUT_SECS`
    ///
    ///   The bearer token is captured here once. It is not refreshed, so an
    ///   expiring OAuth access token (Google issues them for about an hour)
    ///   needs a restart with a fresh value. Use a long-lived credential or
    ///   a local emulator that accepts any token.
    /// - postgres: `DATABASE_URL` (required), `DB_MAX_CONNECTIONS`
    /// - memory: `ARCHIVE_SEED_PATH`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or("PORT", &lookup, DEFAULT_PORT)?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let display_offset = match lookup("ARCHIVE_DISPLAY_UTC_OFFSET") {
            Some(raw) => parse_offset(&raw)
                .ok_or_else(|| ConfigError::Invalid { var: "ARCHIVE_DISPLAY_UTC_OFFSET".into(), value: raw })?,
            None => UtcOffset::UTC,
        };

        let max_views = parse_or("ARCHIVE_MAX_VIEWS", &lookup, DEFAULT_MAX_VIEWS)?;
        if max_views == 0 {
            return Err(ConfigError::Invalid { var: "ARCHIVE_MAX_VIEWS".into(), value: "0".into() });
        }

        let store = match lookup("ARCHIVE_STORE").as_deref().unwrap_or("firestore") {
            "firestore" => StoreConfig::Firestore(firestore_from_lookup(&lookup)?),
            "postgres" => StoreConfig::Postgres(PostgresConfig {
                database_url: require("DATABASE_URL", &lookup)?,
                max_connections: parse_or("DB_MAX_CONNECTIONS", &lookup, DEFAULT_DB_MAX_CONNECTIONS)?,
            }),
            "memory" => StoreConfig::Memory(MemoryConfig { seed_path: lookup("ARCHIVE_SEED_PATH").map(PathBuf::from) }),
            other => {
                return Err(ConfigError::Invalid { var: "ARCHIVE_STORE".into(), value: other.to_string() });
            }
        };

        Ok(Self { bind_addr, port, store, display_offset, max_views })
    }
}

fn firestore_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<FirestoreConfig, ConfigError> {
    let project_id = require("FIRESTORE_PROJECT_ID", lookup)?;
    let database = lookup("FIRESTORE_DATABASE").unwrap_or_else(|| DEFAULT_FIRESTORE_DATABASE.to_string());
    let base_url = lookup("FIRESTORE_BASE_URL")
        .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    let bearer_token = match lookup("FIRESTORE_TOKEN_ENV") {
        Some(token_var) => Some(lookup(&token_var).ok_or(ConfigError::Missing { var: token_var })?),
        None => None,
    };

    let timeouts = HttpTimeouts {
        request_secs: parse_or("FIRESTORE_REQUEST_TIMEOUT_SECS", lookup, DEFAULT_FIRESTORE_REQUEST_TIMEOUT_SECS)?,
        connect_secs: parse_or("FIRESTORE_CONNECT_TIMEOUT_SECS", lookup, DEFAULT_FIRESTORE_CONNECT_TIMEOUT_SECS)?,
    };

    Ok(FirestoreConfig { project_id, database, base_url, bearer_token, timeouts })
}

fn require(key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing { var: key.to_string() })
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key.to_string(), value: raw }),
        None => Ok(default),
    }
}

fn parse_offset(raw: &str) -> Option<UtcOffset> {
    let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    UtcOffset::parse(raw.trim(), &format).ok()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
