//! Archive JSON API — open a view, search it, delete records from it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorCode};
use crate::services::archive::{self, ArchiveError};
use crate::state::{AppState, FilterCriteria, HistoryBrowser};
use crate::store::{ActionType, HistoryRecord, ReagentRef};

pub type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Serialize)]
pub struct RecordResponse {
    pub id: String,
    pub product_number: String,
    pub lot_number: String,
    pub action_type: ActionType,
    pub action_label: &'static str,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    pub display_date: Option<String>,
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub id: Uuid,
    pub filter: FilterCriteria,
    pub reagents: Vec<ReagentRef>,
    pub records: Vec<RecordResponse>,
    pub last_error: Option<ErrorBody>,
}

fn to_record_response(record: &HistoryRecord, offset: UtcOffset) -> RecordResponse {
    RecordResponse {
        id: record.id.clone(),
        product_number: record.product_number.clone(),
        lot_number: record.lot_number.clone(),
        action_type: record.action_type,
        action_label: record.action_type.label(),
        date: record.date,
        display_date: record.date.map(|d| archive::display_timestamp(d, offset)),
    }
}

fn to_response(id: Uuid, view: &HistoryBrowser, offset: UtcOffset) -> ViewResponse {
    ViewResponse {
        id,
        filter: view.filter.clone(),
        reagents: view.reagents.clone(),
        records: view
            .records
            .iter()
            .map(|r| to_record_response(r, offset))
            .collect(),
        last_error: view.last_error.clone(),
    }
}

pub(crate) fn archive_error_to_status(err: &ArchiveError) -> StatusCode {
    match err {
        ArchiveError::ViewNotFound(_) => StatusCode::NOT_FOUND,
        ArchiveError::InvalidDate { .. } => StatusCode::BAD_REQUEST,
        ArchiveError::ReagentRead(_) | ArchiveError::HistoryRead(_) | ArchiveError::Delete { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Store failures are already logged by the service layer.
fn api_error(err: ArchiveError) -> ApiError {
    let status = archive_error_to_status(&err);
    if !status.is_server_error() {
        warn!(error = %err, code = err.error_code(), "archive request rejected");
    }
    (status, Json(ErrorBody::from_error(&err)))
}

/// `POST /api/archive/views` — open a view and load reagent options.
pub async fn create_view(State(state): State<AppState>) -> Result<(StatusCode, Json<ViewResponse>), ApiError> {
    let (id, err) = archive::open_view(&state).await;
    if let Some(err) = err {
        // Only views with loaded options are handed out.
        let _ = archive::close_view(&state, id).await;
        return Err(api_error(err));
    }

    let handle = archive::view_handle(&state, id).await.map_err(api_error)?;
    let view = handle.read().await;
    Ok((StatusCode::CREATED, Json(to_response(id, &view, state.display_offset))))
}

/// `GET /api/archive/views/{id}` — current view state.
pub async fn get_view(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ViewResponse>, ApiError> {
    let handle = archive::view_handle(&state, id).await.map_err(api_error)?;
    let view = handle.read().await;
    Ok(Json(to_response(id, &view, state.display_offset)))
}

/// `DELETE /api/archive/views/{id}` — drop a view.
pub async fn delete_view(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    archive::close_view(&state, id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/archive/views/{id}/search` — set the filter and run it.
pub async fn search_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(filter): Json<FilterCriteria>,
) -> Result<Json<ViewResponse>, ApiError> {
    let handle = archive::view_handle(&state, id).await.map_err(api_error)?;

    archive::set_filter(&handle, filter).await.map_err(api_error)?;
    archive::search(state.store.as_ref(), &handle)
        .await
        .map_err(api_error)?;

    let view = handle.read().await;
    Ok(Json(to_response(id, &view, state.display_offset)))
}

/// `DELETE /api/archive/views/{id}/records/{record_id}` — delete one history.
pub async fn delete_record(
    State(state): State<AppState>,
    Path((id, record_id)): Path<(Uuid, String)>,
) -> Result<Json<ViewResponse>, ApiError> {
    let handle = archive::view_handle(&state, id).await.map_err(api_error)?;

    archive::erase(state.store.as_ref(), &handle, &record_id)
        .await
        .map_err(api_error)?;

    let view = handle.read().await;
    Ok(Json(to_response(id, &view, state.display_offset)))
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod tests;
