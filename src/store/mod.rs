//! Store — the document database holding `reagents` and `histories`.
//!
//! DESIGN
//! ======
//! The archive never talks to a database directly. It goes through the
//! [`ArchiveStore`] capability: two reads and one delete. Backends:
//!
//! - `firestore`: the hosted document database over its REST API.
//! - `postgres`: the same two collections as SQL tables.
//! - `memory`: an in-process store, optionally seeded from JSON.
//!
//! Ordering of histories is the store's job; callers never re-sort.

pub mod firestore;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::config::StoreConfig;
use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request never produced a response.
    #[error("store request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status.
    #[error("store response error: status {status}: {body}")]
    Response { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("store response parse failed: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    #[error("seed load failed: {0}")]
    Seed(String),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_STORE_REQUEST",
            Self::Response { .. } => "E_STORE_RESPONSE",
            Self::Parse(_) => "E_STORE_PARSE",
            Self::Database(_) => "E_DATABASE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Seed(_) => "E_SEED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One entry of the reagent reference list. `product_number` is the
/// document identifier in the `reagents` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReagentRef {
    pub product_number: String,
    #[serde(default)]
    pub name: String,
}

/// Direction of an inventory movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Inbound,
    Outbound,
}

impl ActionType {
    /// `"inbound"` is inbound; anything else counts as outbound.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        if raw == "inbound" { Self::Inbound } else { Self::Outbound }
    }

    /// Table label shown to users.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Inbound => "入庫",
            Self::Outbound => "出庫",
        }
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

/// One inbound/outbound event. Mirrors a document in `histories`.
/// A record without a `date` is never shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub product_number: String,
    #[serde(default)]
    pub lot_number: String,
    pub action_type: ActionType,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
}

// =============================================================================
// CAPABILITY
// =============================================================================

/// Everything the archive needs from the document database.
#[async_trait::async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Every document in `reagents`, in the store's default order.
    async fn list_reagents(&self) -> Result<Vec<ReagentRef>, StoreError>;

    /// Every document in `histories`, ascending by `date`.
    async fn list_histories_ordered_by_date(&self) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Delete one document from `histories`. Deleting an absent id is a no-op.
    async fn delete_history(&self, id: &str) -> Result<(), StoreError>;
}

/// Build the configured backend.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or initialized
/// (pool/migrations for postgres, HTTP client for firestore, seed file for
/// memory).
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ArchiveStore>, StoreError> {
    let store: Arc<dyn ArchiveStore> = match config {
        StoreConfig::Firestore(cfg) => Arc::new(firestore::FirestoreStore::new(cfg.clone())?),
        StoreConfig::Postgres(cfg) => {
            let pool = crate::db::init_pool(cfg).await?;
            Arc::new(postgres::PgStore::new(pool))
        }
        StoreConfig::Memory(cfg) => match &cfg.seed_path {
            Some(path) => Arc::new(memory::MemoryStore::from_seed_file(path).await?),
            None => Arc::new(memory::MemoryStore::default()),
        },
    };
    Ok(store)
}
