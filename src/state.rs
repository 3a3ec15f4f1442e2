//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the store capability and a map of open archive views. Each view
//! is one user's `HistoryBrowser`: filter inputs, reagent options, the
//! displayed records and the last error shown to the user.
//!
//! A view sits behind its own async `RwLock`. Store I/O runs without the
//! lock held; the lock is taken only to snapshot inputs and apply results.
//!
//! Views are bounded: once `max_views` are open, opening another evicts the
//! least recently used one. An evicted page view starts over on next visit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ErrorBody;
use crate::store::{ArchiveStore, HistoryRecord, ReagentRef};

pub const DEFAULT_START_DATE: &str = "2024-01-01";
pub const DEFAULT_END_DATE: &str = "2024-12-31";
pub const DEFAULT_MAX_VIEWS: usize = 256;

// =============================================================================
// FILTER
// =============================================================================

/// Date range (inclusive canonical days) and optional reagent match.
/// An empty `selected_reagent` means every reagent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub selected_reagent: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            start_date: DEFAULT_START_DATE.to_string(),
            end_date: DEFAULT_END_DATE.to_string(),
            selected_reagent: String::new(),
        }
    }
}

// =============================================================================
// HISTORY BROWSER
// =============================================================================

/// View state of the archive page.
#[derive(Debug, Clone, Default)]
pub struct HistoryBrowser {
    pub filter: FilterCriteria,
    /// Reagent options, loaded once when the view opens.
    pub reagents: Vec<ReagentRef>,
    /// Records currently displayed, in store order.
    pub records: Vec<HistoryRecord>,
    pub last_error: Option<ErrorBody>,
}

impl HistoryBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for a product number, if the reagent is known.
    #[must_use]
    pub fn reagent_name(&self, product_number: &str) -> Option<&str> {
        self.reagents
            .iter()
            .find(|r| r.product_number == product_number)
            .map(|r| r.name.as_str())
    }
}

// =============================================================================
// APP STATE
// =============================================================================

pub type ViewHandle = Arc<RwLock<HistoryBrowser>>;

/// An open view plus its last-use stamp for eviction.
pub struct ViewSlot {
    pub handle: ViewHandle,
    last_used: AtomicU64,
}

impl ViewSlot {
    #[must_use]
    pub fn new(handle: ViewHandle, tick: u64) -> Self {
        Self { handle, last_used: AtomicU64::new(tick) }
    }

    pub fn touch(&self, tick: u64) {
        self.last_used.fetch_max(tick, Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ArchiveStore>,
    pub views: Arc<RwLock<HashMap<Uuid, ViewSlot>>>,
    pub display_offset: UtcOffset,
    pub max_views: usize,
    clock: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn ArchiveStore>, display_offset: UtcOffset) -> Self {
        Self {
            store,
            views: Arc::new(RwLock::new(HashMap::new())),
            display_offset,
            max_views: DEFAULT_MAX_VIEWS,
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cap on simultaneously open views (at least one).
    #[must_use]
    pub fn with_max_views(mut self, max_views: usize) -> Self {
        self.max_views = max_views.max(1);
        self
    }

    /// Monotonic use counter for least-recently-used eviction.
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
