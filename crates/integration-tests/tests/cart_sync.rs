//! End-to-end cart flows over HTTP: guest cart, login drain, authenticated
//! edits and logout.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use edustore_cart::{
    AuthSignal, CartCipher, CartError, CartPhase, CartService, DecodeResult, EncryptedCartStore,
    EngineConfig, GatewayError, HttpCartGateway, MemoryStore, SyncError,
};
use edustore_core::{ItemId, SessionMode};
use edustore_integration_tests::{FakeCartBackend, TEST_TOKEN};
use secrecy::SecretString;

const SECRET: &str = "k9#Lm2!qZ8@rT4$w";

struct Client {
    cart: CartService,
    gateway: HttpCartGateway,
    local: MemoryStore,
}

impl Client {
    fn new(backend: &FakeCartBackend) -> Self {
        let local = MemoryStore::new();
        let gateway = HttpCartGateway::new(backend.base_url(), None, None)
            .unwrap();
        let cart = CartService::new(
            EngineConfig::default(),
            store(&local),
            Arc::new(gateway.clone()),
        );
        Self {
            cart,
            gateway,
            local,
        }
    }

    fn log_in(&self) {
        self.gateway
            .set_session_token(Some(SecretString::from(TEST_TOKEN)));
    }

    fn stored(&self) -> DecodeResult {
        store(&self.local).load()
    }
}

fn store(local: &MemoryStore) -> EncryptedCartStore {
    EncryptedCartStore::new(
        Arc::new(local.clone()),
        CartCipher::from_secret(&SecretString::from(SECRET)),
        "edustore.cart",
    )
}

fn item(id: &str) -> ItemId {
    ItemId::new(id)
}

#[tokio::test]
async fn test_guest_cart_is_drained_on_login() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-b", 5);
    let client = Client::new(&backend);

    client.cart.start(false).await.unwrap();
    client.cart.apply_delta(&item("lab-a"), 2).await.unwrap();
    client.cart.increment(&item("lab-b")).await.unwrap();
    assert!(backend.requests().is_empty());
    assert_eq!(client.stored().into_snapshot().total_count(), 3);

    client.log_in();
    client.cart.set_authenticated(true).await.unwrap();

    assert_eq!(
        backend.lines(),
        vec![("lab-b".to_string(), 5), ("lab-a".to_string(), 2)]
    );
    let snapshot = client.cart.snapshot();
    assert_eq!(snapshot.quantity_of(&item("lab-b")), 5);
    assert_eq!(snapshot.quantity_of(&item("lab-a")), 2);
    assert!(snapshot
        .lines()
        .iter()
        .all(|line| line.server_line_id.is_some()));
    assert_eq!(client.stored(), DecodeResult::Empty);
}

#[tokio::test]
async fn test_authenticated_edits_reach_the_server() {
    let backend = FakeCartBackend::start().await;
    let client = Client::new(&backend);
    client.log_in();
    client.cart.start(true).await.unwrap();

    let lab = item("lab-a");
    client.cart.increment(&lab).await.unwrap().settled().await;
    client
        .cart
        .set_quantity(&lab, 3)
        .await
        .unwrap()
        .settled()
        .await;
    client.cart.decrement(&lab).await.unwrap().settled().await;
    assert_eq!(backend.lines(), vec![("lab-a".to_string(), 2)]);

    // Pick up the server line id before removing.
    client.cart.reload().await.unwrap();
    let cart_id = backend.cart_id_of("lab-a").unwrap();
    let outcome = client
        .cart
        .remove_line(&lab)
        .await
        .unwrap()
        .settled()
        .await
        .unwrap();
    assert!(outcome.is_applied());

    assert!(backend.lines().is_empty());
    assert!(backend
        .requests()
        .contains(&format!("DELETE delete-cart {cart_id}")));
    assert_eq!(client.local.write_count(), 0);
}

#[tokio::test]
async fn test_clear_empties_server_cart() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-a", 1);
    backend.seed("lab-b", 2);
    let client = Client::new(&backend);
    client.log_in();
    client.cart.start(true).await.unwrap();
    assert_eq!(client.cart.total_count(), 3);

    let write = client.cart.clear().await.unwrap().unwrap();
    assert!(write.outcome().await.is_applied());

    assert!(backend.lines().is_empty());
    assert_eq!(client.cart.total_count(), 0);
}

#[tokio::test]
async fn test_unauthorized_drain_keeps_guest_cart_for_retry() {
    let backend = FakeCartBackend::start().await;
    let client = Client::new(&backend);
    client.cart.start(false).await.unwrap();
    client.cart.increment(&item("lab-a")).await.unwrap();

    // Session flips before the token reaches the HTTP client.
    let err = client.cart.set_authenticated(true).await.unwrap_err();
    let CartError::Sync(sync) = err else {
        panic!("expected sync error");
    };
    assert!(matches!(
        &*sync,
        SyncError::Fetch(GatewayError::Unauthorized)
    ));
    assert_eq!(client.cart.phase(), CartPhase::Ready);
    assert!(client.cart.is_sync_pending());
    assert_eq!(client.stored().into_snapshot().total_count(), 1);

    client.log_in();
    client.cart.reload().await.unwrap();

    assert_eq!(backend.lines(), vec![("lab-a".to_string(), 1)]);
    assert!(!client.cart.is_sync_pending());
    assert_eq!(client.stored(), DecodeResult::Empty);
}

#[tokio::test]
async fn test_write_rejected_by_server_keeps_optimistic_quantity() {
    let backend = FakeCartBackend::start().await;
    let client = Client::new(&backend);
    client.log_in();
    client.cart.start(true).await.unwrap();
    backend.fail_next(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    let outcome = client
        .cart
        .increment(&item("lab-a"))
        .await
        .unwrap()
        .settled()
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert_eq!(client.cart.total_count(), 1);
    assert!(backend.lines().is_empty());

    client.cart.reload().await.unwrap();
    assert_eq!(client.cart.total_count(), 0);
}

#[tokio::test]
async fn test_auth_signal_drives_login_and_logout() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-z", 1);
    let client = Client::new(&backend);
    client.cart.start(false).await.unwrap();
    client.cart.increment(&item("lab-a")).await.unwrap();

    let signal = AuthSignal::new(false);
    let _listener = client.cart.spawn_auth_listener(&signal);
    let mut view = client.cart.subscribe();

    client.log_in();
    signal.set(true);
    tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.phase.is_ready() && v.mode == SessionMode::Authenticated),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(client.cart.total_count(), 2);

    signal.set(false);
    tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.phase.is_ready() && v.mode == SessionMode::Guest),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(client.cart.snapshot().is_empty());
    assert_eq!(backend.lines().len(), 2);
}
