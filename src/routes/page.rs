//! Archive page — server-rendered HTML over the same views as the JSON API.
//!
//! `GET /archive` opens a view and redirects to it. The search form and the
//! per-row delete buttons post back and redirect to the page (post/redirect/
//! get), so a reload never repeats an operation. Failures show up in the
//! banner from the view's `last_error`.
//!
//! The markup is a Handlebars template; `{{...}}` output is HTML-escaped by
//! the registry, so store text never reaches the page raw.

use std::sync::LazyLock;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use handlebars::{Handlebars, RenderError};
use serde::{Deserialize, Serialize};
use time::UtcOffset;
use tracing::error;
use uuid::Uuid;

use crate::error::ErrorBody;
use crate::services::archive;
use crate::state::{AppState, FilterCriteria, HistoryBrowser};

static REGISTRY: LazyLock<Handlebars<'static>> = LazyLock::new(Handlebars::new);

const ARCHIVE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="utf-8"><title>アーカイブ</title></head>
<body>
<h1>アーカイブ</h1>
{{#if error}}<p class="error" role="alert">{{error.message}} ({{error.code}})</p>{{/if}}
<form method="post" action="/archive/{{view_id}}/search">
<label>開始日 <input type="date" name="start_date" value="{{start_date}}"></label>
<label>終了日 <input type="date" name="end_date" value="{{end_date}}"></label>
<label>試薬名 <select name="selected_reagent"><option value=""{{#if all_selected}} selected{{/if}}>すべて</option>{{#each options}}<option value="{{value}}"{{#if selected}} selected{{/if}}>{{label}}</option>{{/each}}</select></label>
<button type="submit">抽出</button>
</form>
<table>
{{#if caption}}<caption>{{caption}}</caption>{{/if}}
<thead><tr><th>日付</th><th>ロットナンバー</th><th>入庫 or 出庫</th><th>操作</th></tr></thead>
<tbody>{{#each rows}}<tr><td>{{date}}</td><td>{{lot_number}}</td><td>{{action_label}}</td><td><form method="post" action="/archive/{{@root.view_id}}/delete"><input type="hidden" name="record_id" value="{{id}}"><button type="submit">削除</button></form></td></tr>{{/each}}</tbody>
</table>
</body>
</html>
"#;

#[derive(Deserialize)]
pub struct SearchForm {
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub selected_reagent: String,
}

#[derive(Deserialize)]
pub struct DeleteForm {
    pub record_id: String,
}

fn page_path(id: Uuid) -> String {
    format!("/archive/{id}")
}

/// `GET /archive` — open a fresh view.
pub async fn open(State(state): State<AppState>) -> Redirect {
    let (id, _) = archive::open_view(&state).await;
    Redirect::to(&page_path(id))
}

/// `GET /archive/{id}` — render the view. Unknown views start over.
pub async fn show(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Ok(handle) = archive::view_handle(&state, id).await else {
        return Redirect::to("/archive").into_response();
    };
    let view = handle.read().await;
    match render_page(id, &view, state.display_offset) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(view_id = %id, error = %e, "archive page render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /archive/{id}/search` — apply the form's filter and search.
pub async fn search(State(state): State<AppState>, Path(id): Path<Uuid>, Form(form): Form<SearchForm>) -> Redirect {
    let Ok(handle) = archive::view_handle(&state, id).await else {
        return Redirect::to("/archive");
    };

    let filter =
        FilterCriteria { start_date: form.start_date, end_date: form.end_date, selected_reagent: form.selected_reagent };
    // Errors land in `last_error` and are shown on the page.
    if archive::set_filter(&handle, filter).await.is_ok() {
        let _ = archive::search(state.store.as_ref(), &handle).await;
    }
    Redirect::to(&page_path(id))
}

/// `POST /archive/{id}/delete` — delete the posted record.
pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>, Form(form): Form<DeleteForm>) -> Redirect {
    let Ok(handle) = archive::view_handle(&state, id).await else {
        return Redirect::to("/archive");
    };
    let _ = archive::erase(state.store.as_ref(), &handle, &form.record_id).await;
    Redirect::to(&page_path(id))
}

// =============================================================================
// RENDERING
// =============================================================================

#[derive(Serialize)]
struct OptionData<'a> {
    value: &'a str,
    label: &'a str,
    selected: bool,
}

#[derive(Serialize)]
struct RowData<'a> {
    id: &'a str,
    date: String,
    lot_number: &'a str,
    action_label: &'static str,
}

#[derive(Serialize)]
struct PageData<'a> {
    view_id: Uuid,
    start_date: &'a str,
    end_date: &'a str,
    all_selected: bool,
    options: Vec<OptionData<'a>>,
    caption: Option<&'a str>,
    rows: Vec<RowData<'a>>,
    error: Option<&'a ErrorBody>,
}

fn page_data(id: Uuid, view: &HistoryBrowser, offset: UtcOffset) -> PageData<'_> {
    let selected = view.filter.selected_reagent.as_str();
    PageData {
        view_id: id,
        start_date: &view.filter.start_date,
        end_date: &view.filter.end_date,
        all_selected: selected.is_empty(),
        options: view
            .reagents
            .iter()
            .map(|r| OptionData { value: &r.product_number, label: &r.name, selected: r.product_number == selected })
            .collect(),
        caption: view.reagent_name(selected),
        rows: view
            .records
            .iter()
            .map(|r| RowData {
                id: &r.id,
                date: r
                    .date
                    .map(|d| archive::display_timestamp(d, offset))
                    .unwrap_or_default(),
                lot_number: &r.lot_number,
                action_label: r.action_type.label(),
            })
            .collect(),
        error: view.last_error.as_ref(),
    }
}

/// Full page for one view.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn render_page(id: Uuid, view: &HistoryBrowser, offset: UtcOffset) -> Result<String, RenderError> {
    REGISTRY.render_template(ARCHIVE_TEMPLATE, &page_data(id, view, offset))
}

#[cfg(test)]
#[path = "page_test.rs"]
mod tests;
