//! Archive service — reagent options, history search, record deletion.
//!
//! DESIGN
//! ======
//! Three operations act on a view (`ViewHandle`). Each one snapshots what it
//! needs, runs the store call with no lock held, then write-locks the view
//! to apply the outcome. Concurrent searches on one view apply in completion
//! order; the last to finish wins.
//!
//! - `load_reagents`: fetch the reagent option list (once per view).
//! - `search`: fetch every history ordered by date, keep the records whose
//!   UTC canonical day is inside the filter range and, when a reagent is
//!   selected, whose product number matches. Replaces the displayed list.
//! - `erase`: delete one history in the store, then drop it from the
//!   displayed list.
//!
//! Canonical days are `YYYY-MM-DD` with zero-padded fields, so string
//! comparison is date comparison. Days are taken in UTC. Filter bounds must
//! be exactly ten ASCII characters in that shape; signed or expanded years
//! are rejected.
//!
//! ERROR HANDLING
//! ==============
//! Store failures never touch the displayed list or the option list. They
//! are logged here, stored in `last_error` for the page banner and returned
//! to the caller. A successful operation clears `last_error`.

use std::sync::Arc;

use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorCode};
use crate::state::{AppState, FilterCriteria, HistoryBrowser, ViewHandle, ViewSlot};
use crate::store::{ArchiveStore, HistoryRecord, StoreError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to load reagents: {0}")]
    ReagentRead(#[source] StoreError),
    #[error("failed to load histories: {0}")]
    HistoryRead(#[source] StoreError),
    #[error("failed to delete history {id}: {source}")]
    Delete { id: String, source: StoreError },
    #[error("invalid {field} {value:?}: expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },
    #[error("view not found: {0}")]
    ViewNotFound(Uuid),
}

impl ErrorCode for ArchiveError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ReagentRead(_) | Self::HistoryRead(_) => "E_STORE_READ",
            Self::Delete { .. } => "E_STORE_DELETE",
            Self::InvalidDate { .. } => "E_INVALID_DATE",
            Self::ViewNotFound(_) => "E_VIEW_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::ReagentRead(e) | Self::HistoryRead(e) | Self::Delete { source: e, .. } => e.retryable(),
            Self::InvalidDate { .. } | Self::ViewNotFound(_) => false,
        }
    }
}

// =============================================================================
// DAYS
// =============================================================================

/// UTC calendar day of a timestamp as `YYYY-MM-DD`.
///
/// Fixed width holds for years 0000 through 9999, the range `time` supports
/// without its `large-dates` feature. Negative years are never stored.
#[must_use]
pub fn canonical_day(ts: OffsetDateTime) -> String {
    let date = ts.to_offset(UtcOffset::UTC).date();
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Human-facing timestamp in the given offset, e.g. `2024/3/1 9:05:00`.
#[must_use]
pub fn display_timestamp(ts: OffsetDateTime, offset: UtcOffset) -> String {
    let local = ts.to_offset(offset);
    format!(
        "{}/{}/{} {}:{:02}:{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

fn is_day_shaped(value: &str) -> bool {
    value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn check_day(field: &'static str, value: &str) -> Result<(), ArchiveError> {
    let invalid = || ArchiveError::InvalidDate { field, value: value.to_string() };
    if !is_day_shaped(value) {
        return Err(invalid());
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(|_| ())
        .map_err(|_| invalid())
}

/// Reject range bounds that are not canonical days.
///
/// # Errors
///
/// Returns `InvalidDate` naming the first malformed bound.
pub fn validate_filter(filter: &FilterCriteria) -> Result<(), ArchiveError> {
    check_day("start_date", &filter.start_date)?;
    check_day("end_date", &filter.end_date)
}

// =============================================================================
// FILTER
// =============================================================================

/// Keep dated records inside the range (and matching the reagent, if one is
/// selected). Store order is preserved.
#[must_use]
pub fn filter_histories(records: Vec<HistoryRecord>, filter: &FilterCriteria) -> Vec<HistoryRecord> {
    let start = filter.start_date.as_str();
    let end = filter.end_date.as_str();
    let reagent = filter.selected_reagent.as_str();

    records
        .into_iter()
        .filter(|record| {
            let Some(date) = record.date else {
                return false;
            };
            let day = canonical_day(date);
            if day.as_str() < start || day.as_str() > end {
                return false;
            }
            reagent.is_empty() || record.product_number == reagent
        })
        .collect()
}

// =============================================================================
// OPERATIONS
// =============================================================================

fn settle<T>(view: &mut HistoryBrowser, result: Result<T, ArchiveError>) -> Result<T, ArchiveError> {
    match &result {
        Ok(_) => view.last_error = None,
        Err(e) => view.last_error = Some(ErrorBody::from_error(e)),
    }
    result
}

fn log_failure(err: &ArchiveError) {
    if err.retryable() {
        warn!(error = %err, code = err.error_code(), "archive store call failed");
    } else {
        error!(error = %err, code = err.error_code(), "archive store call failed");
    }
}

/// Load the reagent option list into the view.
///
/// # Errors
///
/// Returns `ReagentRead` if the store fails; the option list is unchanged.
pub async fn load_reagents(store: &dyn ArchiveStore, view: &ViewHandle) -> Result<usize, ArchiveError> {
    let fetched = store.list_reagents().await;

    let mut view = view.write().await;
    let result = match fetched {
        Ok(reagents) => {
            let count = reagents.len();
            view.reagents = reagents;
            Ok(count)
        }
        Err(e) => {
            let err = ArchiveError::ReagentRead(e);
            log_failure(&err);
            Err(err)
        }
    };
    settle(&mut view, result)
}

/// Replace the view's filter.
///
/// # Errors
///
/// Returns `InvalidDate` if a bound is malformed; the filter is unchanged.
pub async fn set_filter(view: &ViewHandle, filter: FilterCriteria) -> Result<(), ArchiveError> {
    let mut view = view.write().await;
    let result = validate_filter(&filter).map(|()| view.filter = filter);
    settle(&mut view, result)
}

/// Run the view's filter against the store and replace the displayed list.
///
/// # Errors
///
/// Returns `HistoryRead` if the store fails; the displayed list is unchanged.
pub async fn search(store: &dyn ArchiveStore, view: &ViewHandle) -> Result<usize, ArchiveError> {
    let filter = view.read().await.filter.clone();
    let fetched = store.list_histories_ordered_by_date().await;

    let mut view = view.write().await;
    let result = match fetched {
        Ok(all) => {
            let total = all.len();
            view.records = filter_histories(all, &filter);
            info!(
                fetched = total,
                kept = view.records.len(),
                start = %filter.start_date,
                end = %filter.end_date,
                reagent = %filter.selected_reagent,
                "history search"
            );
            Ok(view.records.len())
        }
        Err(e) => {
            let err = ArchiveError::HistoryRead(e);
            log_failure(&err);
            Err(err)
        }
    };
    settle(&mut view, result)
}

/// Delete a history in the store, then remove it from the displayed list.
/// Returns whether a displayed record was removed.
///
/// # Errors
///
/// Returns `Delete` if the store fails; the displayed list is unchanged.
pub async fn erase(store: &dyn ArchiveStore, view: &ViewHandle, id: &str) -> Result<bool, ArchiveError> {
    let deleted = store.delete_history(id).await;

    let mut view = view.write().await;
    let result = match deleted {
        Ok(()) => {
            let before = view.records.len();
            view.records.retain(|record| record.id != id);
            let removed = view.records.len() != before;
            info!(id, removed, "history deleted");
            Ok(removed)
        }
        Err(source) => {
            let err = ArchiveError::Delete { id: id.to_string(), source };
            log_failure(&err);
            Err(err)
        }
    };
    settle(&mut view, result)
}

// =============================================================================
// VIEWS
// =============================================================================

/// Open a new view and load its reagent options. The view is registered even
/// when loading fails; the error is returned alongside its id. When the
/// registry is full the least recently used view is evicted first.
pub async fn open_view(state: &AppState) -> (Uuid, Option<ArchiveError>) {
    let id = Uuid::new_v4();
    let handle: ViewHandle = Arc::new(RwLock::new(HistoryBrowser::new()));
    let err = load_reagents(state.store.as_ref(), &handle).await.err();
    if let Some(e) = &err {
        warn!(view_id = %id, error = %e, "reagent load failed");
    }

    let mut views = state.views.write().await;
    while views.len() >= state.max_views {
        let Some(oldest) = views
            .iter()
            .min_by_key(|(_, slot)| slot.last_used())
            .map(|(key, _)| *key)
        else {
            break;
        };
        views.remove(&oldest);
        info!(view_id = %oldest, "archive view evicted");
    }
    views.insert(id, ViewSlot::new(handle, state.tick()));
    drop(views);

    info!(view_id = %id, "archive view opened");
    (id, err)
}

/// Look up an open view and mark it as used.
///
/// # Errors
///
/// Returns `ViewNotFound` if no view has this id.
pub async fn view_handle(state: &AppState, id: Uuid) -> Result<ViewHandle, ArchiveError> {
    let views = state.views.read().await;
    let slot = views.get(&id).ok_or(ArchiveError::ViewNotFound(id))?;
    slot.touch(state.tick());
    Ok(slot.handle.clone())
}

/// Drop a view.
///
/// # Errors
///
/// Returns `ViewNotFound` if no view has this id.
pub async fn close_view(state: &AppState, id: Uuid) -> Result<(), ArchiveError> {
    if state.views.write().await.remove(&id).is_none() {
        return Err(ArchiveError::ViewNotFound(id));
    }
    info!(view_id = %id, "archive view closed");
    Ok(())
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod tests;
