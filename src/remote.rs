//! Remote document store: one JSON payload per user identity. The concrete
//! backend is a PostgREST table (`dashboards` with `user_id` and `content`
//! columns); the trait keeps the sync engine testable without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the stored payload for the user, or `None` when the user has
    /// never saved.
    async fn fetch_document(&self, user_id: &str) -> AppResult<Option<Value>>;

    async fn insert_document(&self, user_id: &str, payload: &Value) -> AppResult<()>;

    async fn upsert_document(
        &self,
        user_id: &str,
        payload: &Value,
        timestamp: &str,
    ) -> AppResult<()>;
}

pub struct SupabaseRestStore {
    client: reqwest::Client,
    base_url: String,
    table: String,
    api_key: SecretString,
}

impl SupabaseRestStore {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, table: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            api_key,
        }
    }

    /// Built only when both the endpoint and the anon key are configured.
    pub fn maybe_new(config: &AppConfig) -> Option<Self> {
        let url = config.remote_url.clone()?;
        let key = config.remote_api_key.clone()?;
        Some(Self::new(url, key, config.remote_table.clone()))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn auth_headers(&self) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = self.api_key.expose_secret();
        let mut api_key = HeaderValue::from_str(key)
            .map_err(|_| AppError::Config("remote API key is not a valid header value".into()))?;
        api_key.set_sensitive(true);
        headers.insert("apikey", api_key);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| AppError::Config("remote API key is not a valid header value".into()))?;
        bearer.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn ensure_success(response: reqwest::Response) -> AppResult<()> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Remote(format!("{status}: {body}")))
    }
}

#[async_trait]
impl DocumentStore for SupabaseRestStore {
    async fn fetch_document(&self, user_id: &str) -> AppResult<Option<Value>> {
        let response = self
            .client
            .get(self.table_url())
            .headers(self.auth_headers()?)
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "content".to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Remote(format!(
                "fetch failed with {}",
                response.status()
            )));
        }

        let mut rows: Vec<Value> = response.json().await?;
        debug!(target: "remote", user = user_id, found = !rows.is_empty(), "fetched document");
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(rows.remove(0).get_mut("content").map(Value::take))
    }

    async fn insert_document(&self, user_id: &str, payload: &Value) -> AppResult<()> {
        let response = self
            .client
            .post(self.table_url())
            .headers(self.auth_headers()?)
            .header("Prefer", "return=minimal")
            .json(&json!({ "user_id": user_id, "content": payload }))
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    async fn upsert_document(
        &self,
        user_id: &str,
        payload: &Value,
        timestamp: &str,
    ) -> AppResult<()> {
        let response = self
            .client
            .post(self.table_url())
            .headers(self.auth_headers()?)
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!({
                "user_id": user_id,
                "content": payload,
                "updated_at": timestamp,
            }))
            .send()
            .await?;
        Self::ensure_success(response).await
    }
}

/// In-memory store for tests and offline tooling. Optionally fails the next
/// write to exercise the error status path.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Value>>,
    writes: AtomicUsize,
    fail_next: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(user_id: &str, payload: Value) -> Self {
        let store = Self::default();
        store
            .documents
            .lock()
            .insert(user_id.to_string(), payload);
        store
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn document(&self, user_id: &str) -> Option<Value> {
        self.documents.lock().get(user_id).cloned()
    }

    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> AppResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::Remote("simulated write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_document(&self, user_id: &str) -> AppResult<Option<Value>> {
        Ok(self.documents.lock().get(user_id).cloned())
    }

    async fn insert_document(&self, user_id: &str, payload: &Value) -> AppResult<()> {
        self.take_failure()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .insert(user_id.to_string(), payload.clone());
        Ok(())
    }

    async fn upsert_document(&self, user_id: &str, payload: &Value, _timestamp: &str) -> AppResult<()> {
        self.take_failure()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .insert(user_id.to_string(), payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.fetch_document("ana").await.unwrap().is_none());

        store
            .insert_document("ana", &json!({ "year": 2025 }))
            .await
            .unwrap();
        let doc = store.fetch_document("ana").await.unwrap().unwrap();
        assert_eq!(doc["year"], 2025);

        store
            .upsert_document("ana", &json!({ "year": 2026 }), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let doc = store.fetch_document("ana").await.unwrap().unwrap();
        assert_eq!(doc["year"], 2026);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn injected_failure_only_hits_once() {
        let store = MemoryStore::new();
        store.fail_next_write();
        assert!(store
            .upsert_document("ana", &json!({}), "now")
            .await
            .is_err());
        assert!(store
            .upsert_document("ana", &json!({}), "now")
            .await
            .is_ok());
    }

    #[test]
    fn rest_store_requires_full_configuration() {
        let mut config = AppConfig::default();
        config.remote_url = Some("https://example.supabase.co".into());
        config.remote_api_key = None;
        assert!(SupabaseRestStore::maybe_new(&config).is_none());

        config.remote_api_key = Some(SecretString::from("anon".to_string()));
        assert!(SupabaseRestStore::maybe_new(&config).is_some());
    }
}
