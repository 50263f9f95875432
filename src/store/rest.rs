//! REST-backed document store
//!
//! Plain JSON over HTTPS with a bearer token on every request. Versions map
//! onto `If-Match` preconditions, batches go to a single atomic `/batch`
//! endpoint, and every body passes through [`Envelope`] before use.

use super::envelope::{self, Envelope};
use super::resilience::{RetryConfig, RetryPolicy};
use super::{Collection, Document, DocumentStore, Fields, Query, StoreError, StoreResult, WriteBatch};
use crate::timestamps;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const X_CORRELATION_ID: &str = "X-Correlation-Id";
pub const BATCH_ENDPOINT: &str = "batch";
pub const COUNT_SEGMENT: &str = "$count";

#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    http_client: reqwest::Client,
    access_token: String,
    retry_policy: RetryPolicy,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> StoreResult<Self> {
        Self::with_retry_policy(base_url, access_token, RetryConfig::default())
    }

    pub fn with_retry_policy(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        retry_config: RetryConfig,
    ) -> StoreResult<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("insights-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            access_token: access_token.into(),
            retry_policy: RetryPolicy::new(retry_config),
        })
    }

    pub fn collection_url(&self, collection: &Collection) -> String {
        format!("{}/{}", self.base_url, collection.path())
    }

    pub fn document_url(&self, collection: &Collection, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection.path(), urlencoding::encode(id))
    }

    pub fn count_url(&self, collection: &Collection) -> String {
        format!("{}/{}", self.collection_url(collection), COUNT_SEGMENT)
    }

    pub fn batch_url(&self) -> String {
        format!("{}/{}", self.base_url, BATCH_ENDPOINT)
    }

    /// Send a request, retrying transient failures only when a replay
    /// cannot apply the write twice. 2xx, 404 and 412 come back as
    /// `(status, body)`; anything else is an error.
    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
        body: Option<&Value>,
        if_match: Option<u64>,
    ) -> StoreResult<(u16, Value)> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        debug!("{} {} [{}]", method, url, correlation_id);

        let attempt = || self.send_once(&method, url, params, body, if_match, &correlation_id);
        if is_replay_safe(&method, if_match) {
            self.retry_policy.execute(attempt).await
        } else {
            attempt().await
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        params: &[(String, String)],
        body: Option<&Value>,
        if_match: Option<u64>,
        correlation_id: &str,
    ) -> StoreResult<(u16, Value)> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(&self.access_token)
            .header("Accept", CONTENT_TYPE_JSON)
            .header(X_CORRELATION_ID, correlation_id)
            .query(params);
        if let Some(version) = if_match {
            request = request.header("If-Match", version.to_string());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to read response body: {}", e)))?;

        if response_is_usable(status) {
            Ok((status, parse_body(&text)))
        } else {
            Err(StoreError::Http { status, body: text })
        }
    }
}

/// Inserts, batches and versioned patches may have committed before a
/// lost response, so they are sent once
fn is_replay_safe(method: &Method, if_match: Option<u64>) -> bool {
    if *method == Method::PATCH {
        return if_match.is_none();
    }
    [Method::GET, Method::HEAD, Method::PUT, Method::DELETE].contains(method)
}

fn response_is_usable(status: u16) -> bool {
    (200..300).contains(&status) || status == 404 || status == 412
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

fn classify_transport_error(error: reqwest::Error) -> StoreError {
    if error.is_timeout() {
        StoreError::Unavailable(format!("request timed out: {}", error))
    } else if let Some(status) = error.status() {
        StoreError::Http {
            status: status.as_u16(),
            body: error.to_string(),
        }
    } else {
        StoreError::Unavailable(error.to_string())
    }
}

/// Build a `Document` from a decoded entity payload
pub fn document_from_value(value: Value) -> StoreResult<Document> {
    let Value::Object(mut data) = value else {
        return Err(StoreError::Serialization("entity payload is not an object".to_string()));
    };

    let id = match data.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(StoreError::Serialization("entity payload has no id".to_string())),
    };
    let version = data
        .remove("version")
        .or_else(|| data.remove("_version"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let created_at = data.remove("createdAt").as_ref().and_then(timestamps::normalize);
    let updated_at = data.remove("updatedAt").as_ref().and_then(timestamps::normalize);
    let created_at = created_at.unwrap_or_else(Utc::now);

    Ok(Document {
        id,
        data,
        version,
        created_at,
        updated_at: updated_at.unwrap_or(created_at),
    })
}

fn decode_entity(collection: &Collection, body: Value) -> StoreResult<Option<Document>> {
    match Envelope::entity(body, collection.entity_key()).into_inner() {
        Value::Null => Ok(None),
        payload => document_from_value(payload).map(Some),
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn insert(&self, collection: &Collection, id: &str, fields: Fields) -> StoreResult<Document> {
        let mut payload = fields.clone();
        payload.insert("id".to_string(), Value::String(id.to_string()));
        let body = Value::Object(payload);

        let (status, response) = self
            .send(Method::POST, &self.collection_url(collection), &[], Some(&body), None)
            .await?;
        match status {
            412 => Err(StoreError::conflict(collection, id)),
            404 => Err(StoreError::not_found(collection, id)),
            _ => match decode_entity(collection, response)? {
                Some(doc) => Ok(doc),
                None => {
                    let now = Utc::now();
                    Ok(Document {
                        id: id.to_string(),
                        data: fields,
                        version: 1,
                        created_at: now,
                        updated_at: now,
                    })
                }
            },
        }
    }

    async fn get(&self, collection: &Collection, id: &str) -> StoreResult<Option<Document>> {
        let (status, body) = self
            .send(Method::GET, &self.document_url(collection, id), &[], None, None)
            .await?;
        if status == 404 {
            return Ok(None);
        }
        decode_entity(collection, body)
    }

    async fn list(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<Document>> {
        let params = query.to_query_params();
        let (status, body) = self
            .send(Method::GET, &self.collection_url(collection), &params, None, None)
            .await?;
        if status == 404 {
            return Ok(Vec::new());
        }

        Envelope::list(body, collection.name())
            .into_items()?
            .into_iter()
            .map(document_from_value)
            .collect()
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        fields: Fields,
        expected_version: Option<u64>,
    ) -> StoreResult<Document> {
        let body = Value::Object(fields);
        let (status, response) = self
            .send(
                Method::PATCH,
                &self.document_url(collection, id),
                &[],
                Some(&body),
                expected_version,
            )
            .await?;
        match status {
            404 => Err(StoreError::not_found(collection, id)),
            412 => Err(StoreError::conflict(collection, id)),
            _ => match decode_entity(collection, response)? {
                Some(doc) => Ok(doc),
                None => self
                    .get(collection, id)
                    .await?
                    .ok_or_else(|| StoreError::not_found(collection, id)),
            },
        }
    }

    async fn delete(&self, collection: &Collection, id: &str) -> StoreResult<()> {
        // 404 means already gone
        self.send(Method::DELETE, &self.document_url(collection, id), &[], None, None)
            .await?;
        Ok(())
    }

    async fn count(&self, collection: &Collection, query: &Query) -> StoreResult<u64> {
        let params: Vec<(String, String)> = query
            .to_query_params()
            .into_iter()
            .filter(|(key, _)| key == "$filter")
            .collect();
        let (status, body) = self
            .send(Method::GET, &self.count_url(collection), &params, None, None)
            .await?;
        if status == 404 {
            return Ok(0);
        }
        envelope::decode_count(&body)
    }

    async fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = json!({ "writes": batch.to_json() });
        let (status, response) = self
            .send(Method::POST, &self.batch_url(), &[], Some(&body), None)
            .await?;
        match status {
            404 | 412 => Err(StoreError::Http {
                status,
                body: response.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let store = RestStore::new("https://api.example.com/v1/", "token").unwrap();

        assert_eq!(store.collection_url(&Collection::Clients), "https://api.example.com/v1/clients");
        assert_eq!(
            store.document_url(&Collection::responses("s 1"), "r/1"),
            "https://api.example.com/v1/surveys/s 1/responses/r%2F1"
        );
        assert_eq!(store.count_url(&Collection::Surveys), "https://api.example.com/v1/surveys/$count");
        assert_eq!(store.batch_url(), "https://api.example.com/v1/batch");
    }

    #[test]
    fn test_document_from_value_normalizes_timestamps() {
        let doc = document_from_value(json!({
            "id": "k1",
            "name": "Launch",
            "version": 3,
            "createdAt": {"_seconds": 1714564800, "_nanoseconds": 0},
            "updatedAt": "2024-05-02T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(doc.id, "k1");
        assert_eq!(doc.version, 3);
        assert_eq!(timestamps::to_iso(&doc.created_at), "2024-05-01T12:00:00.000Z");
        assert_eq!(timestamps::to_iso(&doc.updated_at), "2024-05-02T00:00:00.000Z");
        assert!(!doc.data.contains_key("createdAt"));
        assert_eq!(doc.get_str("name"), Some("Launch"));
    }

    #[test]
    fn test_only_replay_safe_requests_are_retried() {
        assert!(is_replay_safe(&Method::GET, None));
        assert!(is_replay_safe(&Method::DELETE, None));
        assert!(is_replay_safe(&Method::PATCH, None));
        assert!(!is_replay_safe(&Method::PATCH, Some(3)));
        assert!(!is_replay_safe(&Method::POST, None));
    }

    #[test]
    fn test_document_from_value_requires_id() {
        assert!(document_from_value(json!({"name": "no id"})).is_err());
        assert!(document_from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_decode_entity_accepts_every_envelope() {
        for body in [
            json!({"data": {"id": "c1", "name": "Acme"}}),
            json!({"client": {"id": "c1", "name": "Acme"}}),
            json!({"id": "c1", "name": "Acme"}),
        ] {
            let doc = decode_entity(&Collection::Clients, body).unwrap().unwrap();
            assert_eq!(doc.id, "c1");
            assert_eq!(doc.get_str("name"), Some("Acme"));
        }
        assert!(decode_entity(&Collection::Clients, Value::Null).unwrap().is_none());
    }
}
