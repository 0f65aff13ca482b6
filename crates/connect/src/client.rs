//! REST API client for pushing mutations and pulling collections.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use thriftly_core::sync::{
    EntityKind, PullSource, RemoteApplyAdapter, RemoteApplyError, RemoteRecord, SyncOperation,
    SyncQueueItem,
};

use crate::error::{ConnectError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// Client for the Thriftly backend REST API.
///
/// One collection endpoint per entity kind: POST creates, PUT updates,
/// DELETE removes, GET fetches the whole collection.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ConnectClient {
    /// Create a new backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the backend API (e.g., "https://api.thriftly.app")
    /// * `access_token` - Bearer token for the signed-in user
    pub fn new(base_url: &str, access_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| ConnectError::invalid_request("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/api/v1/{}", self.base_url, kind.collection_name())
    }

    fn record_url(&self, kind: EntityKind, record_id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), record_id)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Read the body and turn non-success statuses into API errors.
    async fn check_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(ConnectError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(ConnectError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        Ok(body)
    }

    async fn push_mutation(&self, item: &SyncQueueItem) -> Result<()> {
        let headers = self.headers()?;
        let result = match item.operation {
            SyncOperation::Create => {
                let response = self
                    .client
                    .post(self.collection_url(item.entity_kind))
                    .headers(headers)
                    .json(&item.payload)
                    .send()
                    .await?;
                Self::check_response(response).await
            }
            SyncOperation::Update => {
                let response = self
                    .client
                    .put(self.record_url(item.entity_kind, &item.entity_id))
                    .headers(headers)
                    .json(&item.payload)
                    .send()
                    .await?;
                Self::check_response(response).await
            }
            SyncOperation::Delete => {
                let response = self
                    .client
                    .delete(self.record_url(item.entity_kind, &item.entity_id))
                    .headers(headers)
                    .send()
                    .await?;
                let checked = Self::check_response(response).await;
                // Deleting an already-deleted record is a success: the
                // backend converged on the state the user asked for.
                match checked {
                    Err(ConnectError::Api { status: 404, .. }) => Ok(String::new()),
                    other => other,
                }
            }
        };

        result?;
        Ok(())
    }

    async fn fetch_records(&self, kind: EntityKind) -> Result<Vec<RemoteRecord>> {
        let response = self
            .client
            .get(self.collection_url(kind))
            .headers(self.headers()?)
            .send()
            .await?;
        let body = Self::check_response(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RemoteApplyAdapter for ConnectClient {
    async fn apply(&self, item: &SyncQueueItem) -> std::result::Result<(), RemoteApplyError> {
        self.push_mutation(item).await.map_err(RemoteApplyError::from)
    }
}

#[async_trait]
impl PullSource for ConnectClient {
    async fn fetch_collection(
        &self,
        kind: EntityKind,
    ) -> std::result::Result<Vec<RemoteRecord>, RemoteApplyError> {
        self.fetch_records(kind).await.map_err(RemoteApplyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_per_collection() {
        let client = ConnectClient::new("https://api.thriftly.app/", "token");
        assert_eq!(
            client.collection_url(EntityKind::Expense),
            "https://api.thriftly.app/api/v1/expenses"
        );
        assert_eq!(
            client.record_url(EntityKind::SavingsGoal, "g-1"),
            "https://api.thriftly.app/api/v1/savings_goals/g-1"
        );
    }

    #[test]
    fn headers_carry_the_bearer_token() {
        let client = ConnectClient::new("https://api.thriftly.app", "secret-token");
        let headers = client.headers().expect("headers");
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer secret-token")
        );
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn headers_reject_tokens_with_control_characters() {
        let client = ConnectClient::new("https://api.thriftly.app", "bad\ntoken");
        assert!(matches!(
            client.headers(),
            Err(ConnectError::InvalidRequest(_))
        ));
    }
}
