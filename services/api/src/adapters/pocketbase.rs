//! services/api/src/adapters/pocketbase.rs
//!
//! This module contains the record store adapter, which is the concrete implementation
//! of the `RecordStore` port from the `core` crate. It speaks the PocketBase REST API
//! using `reqwest` and authenticates as a service account.

use async_trait::async_trait;
use poc_portal_core::ports::{PortError, PortResult, RecordStore};
use poc_portal_core::Filter;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<Value>,
}

/// A bearer token and the moment it was issued.
struct CachedToken {
    value: String,
    issued_at: Instant,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A `RecordStore` backed by a PocketBase instance.
///
/// The adapter owns the service credential. The token is fetched lazily, reused until
/// it is older than the configured maximum age, and dropped as soon as the backend
/// answers 401 so the next call logs in again. Failed calls are never retried.
pub struct PocketBaseAdapter {
    client: Client,
    config: BackendConfig,
    token: Mutex<Option<CachedToken>>,
}

impl PocketBaseAdapter {
    pub fn new(config: BackendConfig) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn records_url(&self, collection: &str) -> String {
        self.url(&format!("/api/collections/{collection}/records"))
    }

    // --- Authentication ---

    async fn token(&self) -> PortResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.issued_at.elapsed() < self.config.token_max_age {
                return Ok(token.value.clone());
            }
            debug!("Service token expired, logging in again");
        }

        let value = self.login().await?;
        *cached = Some(CachedToken {
            value: value.clone(),
            issued_at: Instant::now(),
        });
        Ok(value)
    }

    async fn login(&self) -> PortResult<String> {
        let url = self.url(&format!(
            "/api/collections/{}/auth-with-password",
            self.config.auth_collection
        ));
        let body = json!({
            "identity": self.config.admin_email,
            "password": self.config.admin_password,
        });

        let response = self.client.post(&url).json(&body).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(collection = %self.config.auth_collection, "Backend rejected the service credentials");
                Err(PortError::Unauthorized)
            }
            _ => {
                let auth: AuthResponse = handle_response(response).await?;
                info!("Service login OK");
                Ok(auth.token)
            }
        }
    }

    /// Drops the cached token, unless another call has already replaced `stale`.
    async fn invalidate_token(&self, stale: &str) {
        let mut cached = self.token.lock().await;
        if cached.as_ref().is_some_and(|t| t.value == stale) {
            *cached = None;
        }
    }

    /// Sends an authenticated request and decodes its JSON answer.
    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let token = self.token().await?;
        let response = request.bearer_auth(&token).send().await.map_err(transport)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token(&token).await;
        }
        handle_response(response).await
    }
}

fn transport(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Unexpected(format!("Backend call timed out: {err}"))
    } else {
        PortError::Unexpected(format!("Backend call failed: {err}"))
    }
}

/// Decodes a 2xx body (an empty body reads as `null`), or turns any other status
/// into a `Backend` error carrying the body text verbatim.
async fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> PortResult<T> {
    let status = response.status();
    let text = response.text().await.map_err(transport)?;

    if !status.is_success() {
        return Err(PortError::Backend {
            status: status.as_u16(),
            message: text,
        });
    }

    let body = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(body)
        .map_err(|e| PortError::Unexpected(format!("Failed to decode backend response: {e}")))
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for PocketBaseAdapter {
    async fn list(&self, collection: &str, filter: &Filter, per_page: u32) -> PortResult<Vec<Value>> {
        let mut query = vec![("perPage", per_page.to_string()), ("skipTotal", "1".to_string())];
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        debug!(collection = %collection, filter = %filter, "Listing records");

        let request = self.client.get(self.records_url(collection)).query(&query);
        let page: ListResponse = self.send(request).await?;
        Ok(page.items)
    }

    async fn create(&self, collection: &str, body: Value) -> PortResult<Value> {
        let request = self.client.post(self.records_url(collection)).json(&body);
        self.send(request).await
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> PortResult<Value> {
        let url = format!("{}/{}", self.records_url(collection), id);
        self.send(self.client.patch(url).json(&body)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        let url = format!("{}/{}", self.records_url(collection), id);
        let _: Value = self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<()> {
        let url = self.url("/api/collections/users/request-password-reset");
        let request = self.client.post(url).json(&json!({ "email": email }));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn health(&self) -> PortResult<()> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(transport)?;
        let _: Value = handle_response(response).await?;
        self.token().await.map(|_| ())
    }
}
