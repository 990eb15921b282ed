//! Integration tests for the Edustore cart client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p edustore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `http_gateway` - `HttpCartGateway` against the cart REST API contract
//! - `cart_sync` - Guest cart, login drain and logout end to end over HTTP
//!
//! Tests run against [`FakeCartBackend`], an axum router bound to an
//! ephemeral port that speaks the backend's wire format (snake-case line
//! fields, numeric cart ids, embedded product details).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Bearer token the fake backend accepts.
pub const TEST_TOKEN: &str = "integration-session-token";

/// A line as the backend stores it.
#[derive(Debug, Clone)]
struct StoredLine {
    cart_id: i64,
    lab_manual_id: String,
    quantity: u32,
    name: Option<String>,
    selling_price: Option<String>,
}

impl StoredLine {
    fn to_json(&self) -> Value {
        let mut line = json!({
            "cart_id": self.cart_id,
            "lab_manual_id": self.lab_manual_id,
            "quantity": self.quantity,
        });
        if self.name.is_some() || self.selling_price.is_some() {
            line["lab_manuals"] = json!({
                "name": self.name,
                "selling_price": self.selling_price,
            });
        }
        line
    }
}

#[derive(Debug, Default)]
struct BackendState {
    lines: Vec<StoredLine>,
    next_cart_id: i64,
    requests: Vec<String>,
    fail_next: Option<StatusCode>,
}

impl BackendState {
    fn upsert(&mut self, item_id: &str, quantity: u32) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.lab_manual_id == item_id) {
            line.quantity = quantity;
            return;
        }
        self.next_cart_id += 1;
        self.lines.push(StoredLine {
            cart_id: self.next_cart_id,
            lab_manual_id: item_id.to_string(),
            quantity,
            name: None,
            selling_price: None,
        });
    }
}

type Shared = Arc<Mutex<BackendState>>;

/// In-process cart backend for integration tests.
///
/// Stops serving when dropped.
pub struct FakeCartBackend {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeCartBackend {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/cart/fetch-cart", get(fetch_cart))
            .route("/api/cart/add-to-cart", post(add_to_cart))
            .route("/api/cart/delete-cart", delete(delete_cart))
            .route("/api/cart/clear-cart", delete(clear_cart))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Failed to read local address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// API base URL to configure the gateway with.
    ///
    /// # Panics
    ///
    /// Never in practice: the address always forms a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).expect("valid base URL")
    }

    /// Put a line into the account cart.
    pub fn seed(&self, item_id: &str, quantity: u32) {
        self.state.lock().upsert(item_id, quantity);
    }

    /// Put a line with product details into the account cart.
    pub fn seed_product(&self, item_id: &str, quantity: u32, name: &str, selling_price: &str) {
        let mut state = self.state.lock();
        state.upsert(item_id, quantity);
        if let Some(line) = state.lines.iter_mut().find(|l| l.lab_manual_id == item_id) {
            line.name = Some(name.to_string());
            line.selling_price = Some(selling_price.to_string());
        }
    }

    /// `(item id, quantity)` of every line, in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<(String, u32)> {
        self.state
            .lock()
            .lines
            .iter()
            .map(|l| (l.lab_manual_id.clone(), l.quantity))
            .collect()
    }

    /// Server-assigned id of an item's line.
    #[must_use]
    pub fn cart_id_of(&self, item_id: &str) -> Option<i64> {
        self.state
            .lock()
            .lines
            .iter()
            .find(|l| l.lab_manual_id == item_id)
            .map(|l| l.cart_id)
    }

    /// Authorized requests received so far, as `"<method> <path> [detail]"`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    /// Answer the next authorized request with `status` instead of handling it.
    pub fn fail_next(&self, status: StatusCode) {
        self.state.lock().fail_next = Some(status);
    }
}

impl Drop for FakeCartBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn authorize(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TEST_TOKEN}");
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "missing or invalid token").into_response()),
    }
}

/// Authorize, log and apply failure injection for one request.
fn admit(state: &Shared, headers: &HeaderMap, request: String) -> Result<(), Response> {
    authorize(headers)?;
    let mut state = state.lock();
    state.requests.push(request);
    match state.fail_next.take() {
        Some(status) => Err((status, "injected failure").into_response()),
        None => Ok(()),
    }
}

async fn fetch_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(response) = admit(&state, &headers, "GET fetch-cart".to_string()) {
        return response;
    }
    let lines: Vec<Value> = state.lock().lines.iter().map(StoredLine::to_json).collect();
    Json(lines).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddToCart {
    item_id: String,
    quantity: u32,
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddToCart>,
) -> Response {
    let request = format!("POST add-to-cart {} {}", body.item_id, body.quantity);
    if let Err(response) = admit(&state, &headers, request) {
        return response;
    }
    state.lock().upsert(&body.item_id, body.quantity);
    Json(json!({"success": true})).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFromCart {
    line_key: Value,
}

async fn delete_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<DeleteFromCart>,
) -> Response {
    let key = match &body.line_key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if let Err(response) = admit(&state, &headers, format!("DELETE delete-cart {key}")) {
        return response;
    }
    // Keys are either a cart id or an item id.
    state
        .lock()
        .lines
        .retain(|l| l.cart_id.to_string() != key && l.lab_manual_id != key);
    StatusCode::NO_CONTENT.into_response()
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(response) = admit(&state, &headers, "DELETE clear-cart".to_string()) {
        return response;
    }
    state.lock().lines.clear();
    StatusCode::NO_CONTENT.into_response()
}
