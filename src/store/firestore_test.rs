use super::*;
use crate::config::HttpTimeouts;
use crate::error::ErrorCode;

fn test_config(base_url: &str) -> FirestoreConfig {
    FirestoreConfig {
        project_id: "lab".into(),
        database: "(default)".into(),
        base_url: base_url.into(),
        bearer_token: None,
        timeouts: HttpTimeouts { request_secs: 5, connect_secs: 1 },
    }
}

// =============================================================================
// document_id
// =============================================================================

#[test]
fn document_id_takes_last_segment() {
    assert_eq!(document_id("projects/lab/databases/(default)/documents/histories/abc123"), "abc123");
    assert_eq!(document_id("bare"), "bare");
}

// =============================================================================
// parse_reagent_page
// =============================================================================

#[test]
fn reagent_page_maps_ids_and_names() {
    let json = r#"{
        "documents": [
            {"name": "projects/lab/databases/(default)/documents/reagents/P-100",
             "fields": {"name": {"stringValue": "Ethanol"}}},
            {"name": "projects/lab/databases/(default)/documents/reagents/P-200",
             "fields": {}}
        ],
        "nextPageToken": "tok-2"
    }"#;
    let (reagents, next) = parse_reagent_page(json).unwrap();
    assert_eq!(
        reagents,
        vec![
            ReagentRef { product_number: "P-100".into(), name: "Ethanol".into() },
            ReagentRef { product_number: "P-200".into(), name: String::new() },
        ]
    );
    assert_eq!(next.as_deref(), Some("tok-2"));
}

#[test]
fn reagent_page_empty_collection() {
    let (reagents, next) = parse_reagent_page("{}").unwrap();
    assert!(reagents.is_empty());
    assert!(next.is_none());
}

#[test]
fn reagent_page_blank_token_ends_paging() {
    let (_, next) = parse_reagent_page(r#"{"documents": [], "nextPageToken": ""}"#).unwrap();
    assert!(next.is_none());
}

#[test]
fn reagent_page_invalid_json_is_parse_error() {
    let err = parse_reagent_page("not json").unwrap_err();
    assert!(matches!(err, StoreError::Parse(_)));
}

// =============================================================================
// parse_history_query
// =============================================================================

#[test]
fn history_query_parses_documents_in_order() {
    let json = r#"[
        {"document": {
            "name": "projects/lab/databases/(default)/documents/histories/h1",
            "fields": {
                "productNumber": {"stringValue": "P1"},
                "lotNumber": {"stringValue": "L-01"},
                "actionType": {"stringValue": "inbound"},
                "date": {"timestampValue": "2024-03-01T10:00:00.123456Z"}
            }
        }, "readTime": "2024-12-01T00:00:00Z"},
        {"document": {
            "name": "projects/lab/databases/(default)/documents/histories/h2",
            "fields": {
                "productNumber": {"integerValue": "42"},
                "lotNumber": {"stringValue": "L-02"},
                "actionType": {"stringValue": "outbound"},
                "date": {"timestampValue": "2024-06-15T23:59:59Z"}
            }
        }}
    ]"#;

    let records = parse_history_query(json).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "h1");
    assert_eq!(records[0].product_number, "P1");
    assert_eq!(records[0].lot_number, "L-01");
    assert_eq!(records[0].action_type, ActionType::Inbound);
    assert_eq!(records[0].date.map(|d| d.month() as u8), Some(3));
    assert_eq!(records[1].id, "h2");
    assert_eq!(records[1].product_number, "42");
    assert_eq!(records[1].action_type, ActionType::Outbound);
}

#[test]
fn history_query_skips_items_without_document() {
    let json = r#"[{"readTime": "2024-12-01T00:00:00Z"}]"#;
    assert!(parse_history_query(json).unwrap().is_empty());
}

#[test]
fn history_query_missing_or_bad_date_is_none() {
    let json = r#"[
        {"document": {"name": "x/histories/nodate", "fields": {"productNumber": {"stringValue": "P1"}}}},
        {"document": {"name": "x/histories/baddate", "fields": {"date": {"timestampValue": "yesterday"}}}}
    ]"#;
    let records = parse_history_query(json).unwrap();
    assert!(records.iter().all(|r| r.date.is_none()));
    assert_eq!(records[0].lot_number, "");
    assert_eq!(records[1].action_type, ActionType::Outbound);
}

#[test]
fn history_query_rejects_object_body() {
    let err = parse_history_query(r#"{"error": {"code": 403}}"#).unwrap_err();
    assert!(matches!(err, StoreError::Parse(_)));
}

// =============================================================================
// URLs
// =============================================================================

#[test]
fn document_url_encodes_ids() {
    let store = FirestoreStore::new(test_config("https://firestore.googleapis.com/v1")).unwrap();
    let url = store.document_url(&[HISTORIES, "a b#c"]).unwrap();
    assert_eq!(
        url.as_str(),
        "https://firestore.googleapis.com/v1/projects/lab/databases/(default)/documents/histories/a%20b%23c"
    );
}

#[test]
fn run_query_url_targets_documents_root() {
    let store = FirestoreStore::new(test_config("http://localhost:8080/v1")).unwrap();
    assert_eq!(
        store.run_query_url(),
        "http://localhost:8080/v1/projects/lab/databases/(default)/documents:runQuery"
    );
}

#[tokio::test]
async fn unreachable_store_is_request_error() {
    let store = FirestoreStore::new(test_config("http://127.0.0.1:9/v1")).unwrap();
    let err = store.list_reagents().await.unwrap_err();
    assert!(matches!(err, StoreError::Request(_)));
    assert!(err.retryable());
}
