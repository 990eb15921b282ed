//! Remote cart API contract and clients.
//!
//! # Architecture
//!
//! - The remote cart is the source of truth for authenticated sessions
//! - Direct mapping of four REST operations: no caching, no retries
//! - [`HttpCartGateway`] talks to the real API with `reqwest`
//! - [`MemoryGateway`] keeps an in-process cart with failure injection, for
//!   tests and offline consumers
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `fetch_all` | `GET /cart/fetch-cart` |
//! | `upsert` | `POST /cart/add-to-cart` `{"itemId", "quantity"}` |
//! | `delete` | `DELETE /cart/delete-cart` `{"lineKey"}` |
//! | `clear_all` | `DELETE /cart/clear-cart` |

mod http;
pub mod memory;

pub use http::HttpCartGateway;
pub use memory::MemoryGateway;

use async_trait::async_trait;
use edustore_core::{CartSnapshot, ItemId, LineKey};
use thiserror::Error;

/// Errors that can occur when calling the cart API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Cart API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First part of the response body.
        body: String,
    },

    /// The session token was missing or rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// Transport failure reported by a non-HTTP gateway.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Unauthorized | Self::Parse(_) | Self::Url(_) => false,
        }
    }
}

/// The four cart operations of the authenticated backend.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Fetch the principal's current cart.
    async fn fetch_all(&self) -> Result<CartSnapshot, GatewayError>;

    /// Create the line or overwrite its quantity (absolute, not a delta).
    async fn upsert(&self, item_id: &ItemId, quantity: u32) -> Result<(), GatewayError>;

    /// Remove one line. Removing an absent line is not an error.
    async fn delete(&self, key: &LineKey) -> Result<(), GatewayError>;

    /// Remove every line of the principal's cart.
    async fn clear_all(&self) -> Result<(), GatewayError>;
}
