//! Edustore cart client.
//!
//! Keeps a shopping cart consistent across an anonymous (guest) session and
//! an authenticated one, and across the switch between them.
//!
//! # Modules
//!
//! - [`store`] - Encrypted local persistence of the guest cart
//! - [`gateway`] - Remote cart API contract, HTTP and in-memory clients
//! - [`engine`] - Reconciliation engine ([`CartService`])
//! - [`auth`] - Session mode signal driving login/logout transitions
//! - [`config`] - Environment-based configuration
//! - [`error`] - Engine error types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use edustore_cart::{
//!     CartCipher, CartConfig, CartService, EncryptedCartStore, FileStore, HttpCartGateway,
//! };
//! use edustore_core::ItemId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CartConfig::from_env()?;
//! let store = EncryptedCartStore::new(
//!     Arc::new(FileStore::new(&config.store_path)),
//!     CartCipher::from_secret(&config.cart_secret),
//!     config.cart_key.clone(),
//! );
//! let gateway = Arc::new(HttpCartGateway::from_config(&config)?);
//!
//! let cart = CartService::new(config.engine, store, gateway);
//! cart.start(config.is_authenticated()).await?;
//! cart.increment(&ItemId::new("lab-manual-42")).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod store;

pub use auth::AuthSignal;
pub use config::{CartConfig, ConfigError, EngineConfig, SyncMutationPolicy, SyncRetryPolicy};
pub use engine::{
    CartNotice, CartPhase, CartService, CartView, Mutation, PendingWrite, SyncReport, WriteOutcome,
};
pub use error::{CartError, SyncError};
pub use gateway::{CartGateway, GatewayError, HttpCartGateway, MemoryGateway};
pub use store::{
    CartCipher, DecodeResult, EncryptedCartStore, FileStore, KeyValueStore, MemoryStore, StoreError,
};
