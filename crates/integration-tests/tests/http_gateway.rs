//! Integration tests for `HttpCartGateway` against the cart REST contract.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use edustore_cart::{CartGateway, GatewayError, HttpCartGateway};
use edustore_core::{ItemId, LineId, LineKey};
use edustore_integration_tests::{FakeCartBackend, TEST_TOKEN};
use rust_decimal::Decimal;
use secrecy::SecretString;

fn gateway(backend: &FakeCartBackend) -> HttpCartGateway {
    HttpCartGateway::new(
        backend.base_url(),
        Some(SecretString::from(TEST_TOKEN)),
        Some(std::time::Duration::from_secs(5)),
    )
    .unwrap()
}

// =============================================================================
// fetch_all
// =============================================================================

#[tokio::test]
async fn test_fetch_empty_cart() {
    let backend = FakeCartBackend::start().await;
    let cart = gateway(&backend).fetch_all().await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_fetch_maps_backend_field_names() {
    let backend = FakeCartBackend::start().await;
    backend.seed_product("lab-phy-1", 2, "Physics Lab Manual", "199.50");
    backend.seed("lab-chem-2", 1);

    let cart = gateway(&backend).fetch_all().await.unwrap();

    assert_eq!(cart.len(), 2);
    let line = cart.get(&ItemId::new("lab-phy-1")).unwrap();
    assert_eq!(line.quantity, 2);
    assert_eq!(line.server_line_id, Some(LineId::new("1")));
    let product = line.product.as_ref().unwrap();
    assert_eq!(product.title.as_deref(), Some("Physics Lab Manual"));
    assert_eq!(product.selling_price, Some(Decimal::new(19950, 2)));
    assert_eq!(line.line_total(), Some(Decimal::new(39900, 2)));

    let bare = cart.get(&ItemId::new("lab-chem-2")).unwrap();
    assert!(bare.product.is_none());
    assert_eq!(cart.total_count(), 3);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_upsert_creates_then_overwrites() {
    let backend = FakeCartBackend::start().await;
    let gw = gateway(&backend);
    let item = ItemId::new("lab-bio-3");

    gw.upsert(&item, 1).await.unwrap();
    gw.upsert(&item, 4).await.unwrap();

    assert_eq!(backend.lines(), vec![("lab-bio-3".to_string(), 4)]);
    assert_eq!(
        backend.requests(),
        vec![
            "POST add-to-cart lab-bio-3 1".to_string(),
            "POST add-to-cart lab-bio-3 4".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_delete_by_server_line_id() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-a", 1);
    backend.seed("lab-b", 1);
    let cart_id = backend.cart_id_of("lab-a").unwrap();

    gateway(&backend)
        .delete(&LineKey::Server(LineId::from(cart_id)))
        .await
        .unwrap();

    assert_eq!(backend.lines(), vec![("lab-b".to_string(), 1)]);
}

#[tokio::test]
async fn test_delete_by_item_id_and_absent_line() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-a", 1);
    let gw = gateway(&backend);

    gw.delete(&LineKey::Item(ItemId::new("lab-a"))).await.unwrap();
    gw.delete(&LineKey::Item(ItemId::new("lab-missing")))
        .await
        .unwrap();

    assert!(backend.lines().is_empty());
}

#[tokio::test]
async fn test_clear_all() {
    let backend = FakeCartBackend::start().await;
    backend.seed("lab-a", 1);
    backend.seed("lab-b", 3);

    gateway(&backend).clear_all().await.unwrap();

    assert!(backend.lines().is_empty());
    assert_eq!(backend.requests(), vec!["DELETE clear-cart".to_string()]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let backend = FakeCartBackend::start().await;
    let gw = HttpCartGateway::new(backend.base_url(), None, None)
        .unwrap();

    let err = gw.fetch_all().await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthorized));
    assert!(!err.is_retryable());

    gw.set_session_token(Some(SecretString::from(TEST_TOKEN)));
    assert!(gw.fetch_all().await.is_ok());
}

#[tokio::test]
async fn test_server_error_is_retryable_status() {
    let backend = FakeCartBackend::start().await;
    backend.fail_next(StatusCode::SERVICE_UNAVAILABLE);
    let gw = gateway(&backend);

    let err = gw.upsert(&ItemId::new("lab-a"), 1).await.unwrap_err();
    match &err {
        GatewayError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "injected failure");
        }
        other => panic!("expected Status error, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(backend.lines().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retryable() {
    let backend = FakeCartBackend::start().await;
    backend.fail_next(StatusCode::BAD_REQUEST);

    let err = gateway(&backend).clear_all().await.unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 400, .. }));
    assert!(!err.is_retryable());
}
