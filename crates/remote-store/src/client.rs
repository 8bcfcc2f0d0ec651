//! PostgREST client for the remote row store.
//!
//! Every replicated table is exposed under `/rest/v1/{table}`. Reads page by
//! `(updated_at, id)`, inserts are upserts on the primary key, and updates and
//! deletes filter by `id=eq.{id}`.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

use ledgerline_core::sync::{RemoteError, RemoteFilter, RemoteStore, SessionProvider, SyncTable};

use crate::config::RemoteStoreConfig;
use crate::error::{RemoteStoreClientError, Result};

const MAX_LOG_BODY_CHARS: usize = 512;
const FILTER_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Client for the PostgREST remote store.
///
/// The access token is read from the session provider on every request, so a
/// refreshed session is picked up without rebuilding the client.
pub struct RemoteStoreClient {
    client: reqwest::Client,
    config: RemoteStoreConfig,
    session: Arc<dyn SessionProvider>,
}

impl RemoteStoreClient {
    pub fn new(config: RemoteStoreConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[RemoteStore] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        warn!("[RemoteStore] Response error ({}): {}", status, preview);
    }

    /// Builds the auth and schema headers. Writes carry `Content-Profile`,
    /// reads carry `Accept-Profile`.
    async fn headers(&self, writing: bool) -> Result<HeaderMap> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or_else(|| RemoteStoreClientError::auth("No signed-in session"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RemoteStoreClientError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let api_key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|_| RemoteStoreClientError::Config("Invalid API key format".to_string()))?;
        headers.insert("apikey", api_key);

        let schema = HeaderValue::from_str(&self.config.schema)
            .map_err(|_| RemoteStoreClientError::Config("Invalid schema name".to_string()))?;
        let profile = if writing {
            "content-profile"
        } else {
            "accept-profile"
        };
        headers.insert(profile, schema);

        Ok(headers)
    }

    /// Reads the body and turns non-success statuses into `Api` errors.
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            let message = match serde_json::from_str::<PostgrestError>(&body) {
                Ok(PostgrestError {
                    code: Some(code),
                    message,
                }) => format!("{}: {}", code, message),
                Ok(PostgrestError { message, .. }) => message,
                Err(_) => format!("Request failed: {}", body),
            };
            return Err(RemoteStoreClientError::api(status.as_u16(), message));
        }
        Ok(body)
    }

    pub async fn select_rows(&self, table: SyncTable, filter: &RemoteFilter) -> Result<Vec<Value>> {
        if filter.limit == 0 {
            return Err(RemoteStoreClientError::InvalidRequest(
                "page limit must be positive".to_string(),
            ));
        }

        let mut query: Vec<(&str, String)> = vec![
            ("select", "*".to_string()),
            ("order", "updated_at.asc,id.asc".to_string()),
            ("limit", filter.limit.to_string()),
        ];
        if let Some(after) = filter.updated_after {
            let stamp = after.format(FILTER_TIMESTAMP_FORMAT).to_string();
            match &filter.after_id {
                Some(after_id) => {
                    let stamp = quote_value(&stamp);
                    query.push((
                        "or",
                        format!(
                            "(updated_at.gt.{stamp},and(updated_at.eq.{stamp},id.gt.{}))",
                            quote_value(after_id)
                        ),
                    ));
                }
                None => query.push(("updated_at", format!("gt.{stamp}"))),
            }
        }

        debug!(
            "[RemoteStore] GET {} after={:?}/{:?} limit={}",
            table, filter.updated_after, filter.after_id, filter.limit
        );
        let response = self
            .client
            .get(self.config.rest_url(table.as_str()))
            .headers(self.headers(false).await?)
            .query(&query)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn upsert_row(&self, table: SyncTable, row: &Value) -> Result<()> {
        if !row.is_object() {
            return Err(RemoteStoreClientError::InvalidRequest(format!(
                "{} row must be a JSON object",
                table
            )));
        }

        debug!("[RemoteStore] POST {}", table);
        let mut headers = self.headers(true).await?;
        headers.insert(
            "prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let response = self
            .client
            .post(self.config.rest_url(table.as_str()))
            .headers(headers)
            .query(&[("on_conflict", "id")])
            .json(&[row])
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }

    pub async fn patch_row(&self, table: SyncTable, id: &str, partial: &Value) -> Result<()> {
        debug!("[RemoteStore] PATCH {} id={}", table, id);
        let mut headers = self.headers(true).await?;
        headers.insert("prefer", HeaderValue::from_static("return=minimal"));
        let response = self
            .client
            .patch(self.config.rest_url(table.as_str()))
            .headers(headers)
            .query(&[("id", format!("eq.{}", id))])
            .json(partial)
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }

    /// PostgREST answers a filter that matches nothing with success, so a
    /// missing row is not an error here.
    pub async fn delete_row(&self, table: SyncTable, id: &str) -> Result<()> {
        debug!("[RemoteStore] DELETE {} id={}", table, id);
        let response = self
            .client
            .delete(self.config.rest_url(table.as_str()))
            .headers(self.headers(true).await?)
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        match Self::read_body(response).await {
            Err(RemoteStoreClientError::Api { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteStoreClient {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
        Ok(self.select_rows(table, filter).await?)
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> std::result::Result<(), RemoteError> {
        Ok(self.upsert_row(table, row).await?)
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> std::result::Result<(), RemoteError> {
        Ok(self.patch_row(table, id, partial).await?)
    }

    async fn delete(&self, table: SyncTable, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.delete_row(table, id).await?)
    }
}

/// Double-quotes a filter value so reserved characters such as `,` `.` `:`
/// survive inside logical `or=(...)` trees.
fn quote_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
