//! `reqwest` client for the cart REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edustore_core::{CartSnapshot, ItemId, LineKey};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use super::{CartGateway, GatewayError};
use crate::config::CartConfig;

const FETCH_PATH: &str = "cart/fetch-cart";
const UPSERT_PATH: &str = "cart/add-to-cart";
const DELETE_PATH: &str = "cart/delete-cart";
const CLEAR_PATH: &str = "cart/clear-cart";

/// Characters of an error body kept in logs and errors.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertBody<'a> {
    item_id: &'a ItemId,
    quantity: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody<'a> {
    line_key: &'a LineKey,
}

/// HTTP client for the authenticated cart API.
///
/// Cheaply cloneable; clones share the connection pool and session token.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    session_token: RwLock<Option<SecretString>>,
}

impl std::fmt::Debug for HttpCartGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartGateway")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session_token", &"[REDACTED]")
            .finish()
    }
}

impl HttpCartGateway {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        base_url: Url,
        session_token: Option<SecretString>,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(HttpCartGatewayInner {
                client: builder.build()?,
                base_url: with_trailing_slash(base_url),
                session_token: RwLock::new(session_token),
            }),
        })
    }

    /// Create a client from the cart configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &CartConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.api_base_url.clone(),
            config.session_token.clone(),
            config.request_timeout,
        )
    }

    /// Replace the bearer token sent with every request (login/logout).
    pub fn set_session_token(&self, token: Option<SecretString>) {
        *self.inner.session_token.write() = token;
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        let mut builder = self.inner.client.request(method, self.endpoint(path)?);
        if let Some(token) = self.inner.session_token.read().as_ref() {
            builder = builder.bearer_auth(token.expose_secret());
        }
        Ok(builder)
    }

    /// Send a request and return the response body of a success status.
    async fn send(&self, builder: RequestBuilder) -> Result<String, GatewayError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }

        if !status.is_success() {
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::error!(
                status = %status,
                body = %body,
                "Cart API returned non-success status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<CartSnapshot, GatewayError> {
        let body = self.send(self.request(Method::GET, FETCH_PATH)?).await?;
        if body.trim().is_empty() {
            return Ok(CartSnapshot::new());
        }

        let snapshot: Option<CartSnapshot> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(ERROR_BODY_LIMIT).collect::<String>(),
                "Failed to parse cart API response"
            );
            e
        })?;
        let snapshot = snapshot.unwrap_or_default();
        debug!(lines = snapshot.len(), "Fetched remote cart");
        Ok(snapshot)
    }

    #[instrument(skip(self, item_id), fields(item_id = %item_id))]
    async fn upsert(&self, item_id: &ItemId, quantity: u32) -> Result<(), GatewayError> {
        let builder = self
            .request(Method::POST, UPSERT_PATH)?
            .json(&UpsertBody { item_id, quantity });
        self.send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self, key), fields(line_key = %key))]
    async fn delete(&self, key: &LineKey) -> Result<(), GatewayError> {
        let builder = self
            .request(Method::DELETE, DELETE_PATH)?
            .json(&DeleteBody { line_key: key });
        self.send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<(), GatewayError> {
        self.send(self.request(Method::DELETE, CLEAR_PATH)?).await?;
        Ok(())
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpCartGateway {
        HttpCartGateway::new(Url::parse(base).unwrap(), None, None).unwrap()
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let gw = gateway("https://api.example.test/v1");
        assert_eq!(
            gw.endpoint(FETCH_PATH).unwrap().as_str(),
            "https://api.example.test/v1/cart/fetch-cart"
        );
    }

    #[test]
    fn test_endpoint_at_root() {
        let gw = gateway("https://api.example.test");
        assert_eq!(
            gw.endpoint(CLEAR_PATH).unwrap().as_str(),
            "https://api.example.test/cart/clear-cart"
        );
    }

    #[test]
    fn test_request_bodies() {
        let item = ItemId::new("lab-1");
        let body = serde_json::to_value(UpsertBody {
            item_id: &item,
            quantity: 3,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"itemId": "lab-1", "quantity": 3}));

        let key = LineKey::Item(item);
        let body = serde_json::to_value(DeleteBody { line_key: &key }).unwrap();
        assert_eq!(body, serde_json::json!({"lineKey": "lab-1"}));
    }

    #[test]
    fn test_debug_redacts_token() {
        let gw = HttpCartGateway::new(
            Url::parse("https://api.example.test").unwrap(),
            Some(SecretString::from("super_secret_session_token")),
            None,
        )
        .unwrap();
        let debug_output = format!("{gw:?}");
        assert!(!debug_output.contains("super_secret_session_token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
