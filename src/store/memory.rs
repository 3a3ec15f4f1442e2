//! In-process store. Holds both collections behind async locks.
//!
//! Used by tests and for local runs without a database. A seed file is a
//! JSON object `{ "reagents": [...], "histories": [...] }` with RFC 3339
//! dates.

use std::path::Path;

use serde::Deserialize;
use tokio::sync::RwLock;

use super::{ArchiveStore, HistoryRecord, ReagentRef, StoreError};

#[derive(Debug, Default, Deserialize)]
struct Seed {
    #[serde(default)]
    reagents: Vec<ReagentRef>,
    #[serde(default)]
    histories: Vec<HistoryRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    reagents: RwLock<Vec<ReagentRef>>,
    histories: RwLock<Vec<HistoryRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(reagents: Vec<ReagentRef>, histories: Vec<HistoryRecord>) -> Self {
        Self { reagents: RwLock::new(reagents), histories: RwLock::new(histories) }
    }

    /// Load a seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid seed JSON.
    pub async fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Seed(format!("{}: {e}", path.display())))?;
        Self::from_seed_json(&raw)
    }

    /// Parse seed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the seed shape.
    pub fn from_seed_json(raw: &str) -> Result<Self, StoreError> {
        let seed: Seed = serde_json::from_str(raw).map_err(|e| StoreError::Seed(e.to_string()))?;
        Ok(Self::new(seed.reagents, seed.histories))
    }

    /// Current contents of `histories`, in insertion order.
    #[cfg(test)]
    pub async fn histories(&self) -> Vec<HistoryRecord> {
        self.histories.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ArchiveStore for MemoryStore {
    async fn list_reagents(&self) -> Result<Vec<ReagentRef>, StoreError> {
        Ok(self.reagents.read().await.clone())
    }

    async fn list_histories_ordered_by_date(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut rows = self.histories.read().await.clone();
        // Stable: equal dates keep insertion order; undated rows go last.
        rows.sort_by_key(|h| (h.date.is_none(), h.date));
        Ok(rows)
    }

    async fn delete_history(&self, id: &str) -> Result<(), StoreError> {
        self.histories.write().await.retain(|h| h.id != id);
        Ok(())
    }
}
