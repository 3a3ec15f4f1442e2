//! Hosted document database over its REST API.
//!
//! Thin HTTP wrapper: list `reagents` page by page, `runQuery` on
//! `histories` ordered by `date`, and delete a single history document.
//! Response parsing lives in pure functions for testability.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use super::{ActionType, ArchiveStore, HistoryRecord, ReagentRef, StoreError};
use crate::config::FirestoreConfig;

const REAGENTS: &str = "reagents";
const HISTORIES: &str = "histories";
const LIST_PAGE_SIZE: u32 = 300;

// =============================================================================
// CLIENT
// =============================================================================

pub struct FirestoreStore {
    http: reqwest::Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| StoreError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// URL of `<documents root>/<segments...>`, each segment percent-encoded.
    fn document_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| StoreError::Request(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Request(format!("base URL cannot have a path: {}", self.config.base_url)))?
            .pop_if_empty()
            .extend(self.config.documents_path().split('/'))
            .extend(segments);
        Ok(url)
    }

    fn run_query_url(&self) -> String {
        format!("{}/{}:runQuery", self.config.base_url, self.config.documents_path())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Response { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ArchiveStore for FirestoreStore {
    async fn list_reagents(&self) -> Result<Vec<ReagentRef>, StoreError> {
        let url = self.document_url(&[REAGENTS])?;
        let mut reagents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(url.clone())
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let text = self.send(request).await?;
            let (page, next) = parse_reagent_page(&text)?;
            debug!(count = page.len(), more = next.is_some(), "reagent page fetched");
            reagents.extend(page);

            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(reagents)
    }

    async fn list_histories_ordered_by_date(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let body = serde_json::json!({
            "structuredQuery": {
                "from": [{ "collectionId": HISTORIES }],
                "orderBy": [{ "field": { "fieldPath": "date" }, "direction": "ASCENDING" }],
            }
        });
        let text = self
            .send(self.http.post(self.run_query_url()).json(&body))
            .await?;
        parse_history_query(&text)
    }

    async fn delete_history(&self, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(&[HISTORIES, id])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

/// A typed field value. Exactly one member is set on the wire.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    string_value: Option<String>,
    integer_value: Option<String>,
    timestamp_value: Option<String>,
}

impl Document {
    fn id(&self) -> &str {
        document_id(&self.name)
    }

    fn text(&self, field: &str) -> Option<String> {
        let value = self.fields.get(field)?;
        value.string_value.clone().or_else(|| value.integer_value.clone())
    }

    fn timestamp(&self, field: &str) -> Option<OffsetDateTime> {
        let raw = self.fields.get(field)?.timestamp_value.as_deref()?;
        OffsetDateTime::parse(raw, &Rfc3339).ok()
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Last path segment of a document resource name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn parse_reagent_page(json: &str) -> Result<(Vec<ReagentRef>, Option<String>), StoreError> {
    let page: ListDocumentsResponse = serde_json::from_str(json).map_err(|e| StoreError::Parse(e.to_string()))?;
    let reagents = page
        .documents
        .iter()
        .map(|doc| ReagentRef { product_number: doc.id().to_string(), name: doc.text("name").unwrap_or_default() })
        .collect();
    let next = page.next_page_token.filter(|t| !t.is_empty());
    Ok((reagents, next))
}

fn parse_history_query(json: &str) -> Result<Vec<HistoryRecord>, StoreError> {
    let items: Vec<RunQueryItem> = serde_json::from_str(json).map_err(|e| StoreError::Parse(e.to_string()))?;
    Ok(items
        .into_iter()
        .filter_map(|item| item.document)
        .map(|doc| HistoryRecord {
            id: doc.id().to_string(),
            product_number: doc.text("productNumber").unwrap_or_default(),
            lot_number: doc.text("lotNumber").unwrap_or_default(),
            action_type: ActionType::from_wire(doc.text("actionType").as_deref().unwrap_or_default()),
            date: doc.timestamp("date"),
        })
        .collect())
}

#[cfg(test)]
#[path = "firestore_test.rs"]
mod tests;
