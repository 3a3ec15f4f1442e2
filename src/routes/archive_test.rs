use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;
use crate::routes::app;
use crate::state::test_helpers::{self, FailingStore, reagent, sample_histories};
use crate::store::StoreError;
use crate::store::memory::MemoryStore;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bare(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

fn record_ids(view: &Value) -> Vec<String> {
    view["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

async fn open(router: &Router) -> String {
    let (status, body) = send(router, bare("POST", "/api/archive/views")).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

fn full_year(reagent: &str) -> Value {
    json!({ "start_date": "2024-01-01", "end_date": "2024-12-31", "selected_reagent": reagent })
}

// =============================================================================
// archive_error_to_status
// =============================================================================

#[test]
fn error_status_mapping() {
    assert_eq!(archive_error_to_status(&ArchiveError::ViewNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(
        archive_error_to_status(&ArchiveError::InvalidDate { field: "start_date", value: "x".into() }),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        archive_error_to_status(&ArchiveError::HistoryRead(StoreError::Parse("x".into()))),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        archive_error_to_status(&ArchiveError::Delete { id: "a".into(), source: StoreError::Request("x".into()) }),
        StatusCode::BAD_GATEWAY
    );
}

// =============================================================================
// create / get / delete view
// =============================================================================

#[tokio::test]
async fn create_view_returns_options_and_default_filter() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let (status, body) = send(&router, bare("POST", "/api/archive/views")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["filter"]["start_date"], "2024-01-01");
    assert_eq!(body["filter"]["end_date"], "2024-12-31");
    assert_eq!(body["filter"]["selected_reagent"], "");
    assert_eq!(body["reagents"][0]["product_number"], "P1");
    assert_eq!(body["reagents"][1]["name"], "Acetone");
    assert_eq!(body["records"], json!([]));
    assert!(body["last_error"].is_null());
}

#[tokio::test]
async fn create_view_store_failure_is_bad_gateway_and_leaves_no_view() {
    let store = Arc::new(FailingStore::new(MemoryStore::default(), true, false));
    let state = AppState::new(store, UtcOffset::UTC);
    let router = app(state.clone());

    let (status, body) = send(&router, bare("POST", "/api/archive/views")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_STORE_READ");
    assert_eq!(body["retryable"], true);
    assert!(state.views.read().await.is_empty());
}

#[tokio::test]
async fn get_and_delete_view() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let id = open(&router).await;

    let (status, body) = send(&router, bare("GET", &format!("/api/archive/views/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, _) = send(&router, bare("DELETE", &format!("/api/archive/views/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, bare("GET", &format!("/api/archive/views/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E_VIEW_NOT_FOUND");
}

// =============================================================================
// search
// =============================================================================

#[tokio::test]
async fn search_without_reagent_returns_a_then_b() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let id = open(&router).await;

    let (status, body) = send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year(""))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record_ids(&body), ["A", "B"]);

    let a = &body["records"][0];
    assert_eq!(a["lot_number"], "LOT-A");
    assert_eq!(a["action_type"], "inbound");
    assert_eq!(a["action_label"], "入庫");
    assert_eq!(a["date"], "2024-03-01T10:00:00Z");
    assert_eq!(a["display_date"], "2024/3/1 10:00:00");
}

#[tokio::test]
async fn search_with_reagent_returns_only_a() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let id = open(&router).await;

    let (status, body) = send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year("P1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record_ids(&body), ["A"]);
    assert_eq!(body["filter"]["selected_reagent"], "P1");
}

#[tokio::test]
async fn search_rejects_malformed_dates() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let id = open(&router).await;

    let filter = json!({ "start_date": "2024/01/01", "end_date": "2024-12-31" });
    let (status, body) = send(&router, post_json(&format!("/api/archive/views/{id}/search"), &filter)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_DATE");
}

#[tokio::test]
async fn search_unknown_view_is_not_found() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let uri = format!("/api/archive/views/{}/search", Uuid::new_v4());
    let (status, _) = send(&router, post_json(&uri, &full_year(""))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// delete record
// =============================================================================

#[tokio::test]
async fn delete_record_removes_it_from_view_and_store() {
    let store = test_helpers::sample_store();
    let router = app(test_helpers::test_app_state(store.clone()));
    let id = open(&router).await;
    send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year(""))).await;

    let (status, body) = send(&router, bare("DELETE", &format!("/api/archive/views/{id}/records/A"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record_ids(&body), ["B"]);
    assert!(store.histories().await.iter().all(|h| h.id != "A"));
}

#[tokio::test]
async fn delete_record_failure_keeps_view() {
    let inner = MemoryStore::new(vec![reagent("P1", "Ethanol")], sample_histories());
    let state = AppState::new(Arc::new(FailingStore::new(inner, false, true)), UtcOffset::UTC);
    let router = app(state);
    let id = open(&router).await;
    send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year(""))).await;

    let (status, body) = send(&router, bare("DELETE", &format!("/api/archive/views/{id}/records/A"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_STORE_DELETE");

    let (_, view) = send(&router, bare("GET", &format!("/api/archive/views/{id}"))).await;
    assert_eq!(record_ids(&view), ["A", "B"]);
    assert_eq!(view["last_error"]["code"], "E_STORE_DELETE");
}

#[tokio::test]
async fn search_failure_is_bad_gateway_and_keeps_records() {
    let inner = MemoryStore::new(vec![reagent("P1", "Ethanol")], sample_histories());
    let store = Arc::new(FailingStore::new(inner, false, false));
    let router = app(AppState::new(store.clone(), UtcOffset::UTC));
    let id = open(&router).await;
    send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year(""))).await;

    store.set_fail_reads(true);
    let (status, body) = send(&router, post_json(&format!("/api/archive/views/{id}/search"), &full_year("P1"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_STORE_READ");
    assert_eq!(body["retryable"], true);

    let (_, view) = send(&router, bare("GET", &format!("/api/archive/views/{id}"))).await;
    assert_eq!(record_ids(&view), ["A", "B"]);
    assert_eq!(view["filter"]["selected_reagent"], "P1");
}

#[tokio::test]
async fn search_rejects_signed_year_bounds() {
    let router = app(test_helpers::test_app_state(test_helpers::sample_store()));
    let id = open(&router).await;

    let (status, body) = send(
        &router,
        post_json(
            &format!("/api/archive/views/{id}/search"),
            &json!({ "start_date": "+2024-01-01", "end_date": "+2024-12-31" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_DATE");
}
