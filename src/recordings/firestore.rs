use crate::recordings::models::{audio_object_path, ProcessingStatus, Recording};
use crate::recordings::repository::{RecordRepository, RepositoryError};
use crate::recordings::storage::ObjectStoreManager;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, warn};

const COLLECTION: &str = "recordings";

/// Upper bound of a prefix range query on a string field
const PREFIX_RANGE_END: char = '\u{f8ff}';

/// Document as returned by the Firestore REST API
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

fn string_field(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn number_field(fields: &HashMap<String, Value>, key: &str) -> Option<f64> {
    let value = fields.get(key)?;
    if let Some(double) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(double);
    }
    // integerValue is transported as a string
    match value.get("integerValue")? {
        Value::String(s) => s.parse::<i64>().ok().map(|n| n as f64),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn timestamp_field(fields: &HashMap<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(key)?.get("timestampValue")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Convert a document into a [`Recording`].
///
/// Returns `None` when `recordedAt` is missing or unparseable.
pub fn convert_document(document: &Document) -> Option<Recording> {
    let id = document.name.rsplit('/').next().unwrap_or_default().to_string();
    let fields = &document.fields;

    let Some(recorded_at) = timestamp_field(fields, "recordedAt") else {
        warn!("Skipping recording {} due to invalid 'recordedAt' timestamp", id);
        return None;
    };

    let created_at = timestamp_field(fields, "createdAt");
    if created_at.is_none() {
        debug!("Recording {} has no valid 'createdAt' timestamp", id);
    }

    Some(Recording {
        phone_number: string_field(fields, "phoneNumber").unwrap_or_default(),
        recorded_at,
        duration: number_field(fields, "duration").unwrap_or(0.0),
        audio_url: non_empty(string_field(fields, "audioUrl")),
        transcript: non_empty(string_field(fields, "transcript")),
        summary: non_empty(string_field(fields, "summary")),
        file_name: string_field(fields, "fileName").unwrap_or_default(),
        status: ProcessingStatus::parse(&string_field(fields, "status").unwrap_or_default()),
        created_at,
        id,
    })
}

/// Record repository backed by the Firestore REST API
#[derive(Clone)]
pub struct FirestoreRepository {
    client: Client,
    base_url: String,
    id_token: Option<String>,
    object_store: Option<ObjectStoreManager>,
}

impl FirestoreRepository {
    pub fn new(project_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!(
                "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
                project_id
            ),
            id_token: None,
            object_store: None,
        }
    }

    /// Point at a different documents root (emulator, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    /// Resolve missing audio URLs through `object_store`
    pub fn with_object_store(mut self, object_store: ObjectStoreManager) -> Self {
        self.object_store = Some(object_store);
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, RepositoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RepositoryError::Unauthenticated);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(RepositoryError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn run_query(&self, structured_query: Value) -> Result<Vec<Recording>, RepositoryError> {
        let url = format!("{}:runQuery", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&json!({ "structuredQuery": structured_query }))
            .send()
            .await?;
        let items: Vec<RunQueryItem> = Self::check(response).await?.json().await?;

        Ok(items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .filter_map(convert_document)
            .collect())
    }
}

#[async_trait::async_trait]
impl RecordRepository for FirestoreRepository {
    async fn list_recent(&self, limit: usize) -> Result<Vec<Recording>, RepositoryError> {
        self.run_query(json!({
            "from": [{ "collectionId": COLLECTION }],
            "orderBy": [{
                "field": { "fieldPath": "recordedAt" },
                "direction": "DESCENDING"
            }],
            "limit": limit,
        }))
        .await
        .inspect_err(|e| error!("Failed to list recordings: {}", e))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Recording>, RepositoryError> {
        let url = format!("{}/{}/{}", self.base_url, COLLECTION, urlencoding::encode(id));
        let response = self.authorize(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Recording {} does not exist", id);
            return Ok(None);
        }
        let document: Document = Self::check(response).await?.json().await?;

        let Some(mut recording) = convert_document(&document) else {
            error!("Failed to convert document for recording {}", id);
            return Ok(None);
        };

        if recording.audio_url.is_none() {
            if let Some(store) = &self.object_store {
                match store.playable_url(&audio_object_path(id)).await {
                    Ok(url) => recording.audio_url = Some(url),
                    Err(e) => warn!("Failed to resolve audio for recording {}: {}", id, e),
                }
            }
        }

        Ok(Some(recording))
    }

    async fn search_by_phone_prefix(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recording>, RepositoryError> {
        let upper = format!("{}{}", term, PREFIX_RANGE_END);
        self.run_query(json!({
            "from": [{ "collectionId": COLLECTION }],
            "where": {
                "compositeFilter": {
                    "op": "AND",
                    "filters": [
                        { "fieldFilter": {
                            "field": { "fieldPath": "phoneNumber" },
                            "op": "GREATER_THAN_OR_EQUAL",
                            "value": { "stringValue": term }
                        }},
                        { "fieldFilter": {
                            "field": { "fieldPath": "phoneNumber" },
                            "op": "LESS_THAN_OR_EQUAL",
                            "value": { "stringValue": upper }
                        }}
                    ]
                }
            },
            "limit": limit,
        }))
        .await
        .inspect_err(|e| error!("Failed to search recordings: {}", e))
    }
}
