//! Engine error types.

use std::sync::Arc;

use edustore_core::ItemId;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Failure of the login drain.
///
/// Every variant leaves the engine `Ready` with an empty authenticated cart
/// and the sync marked pending.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server cart could not be fetched before uploading.
    #[error("Failed to fetch remote cart: {0}")]
    Fetch(#[source] GatewayError),

    /// Uploading one guest line failed. Lines uploaded before it stay on the
    /// server; the guest cart is kept for a retry.
    #[error("Failed to upload item {item_id}: {source}")]
    Upload {
        item_id: ItemId,
        #[source]
        source: GatewayError,
    },

    /// Everything was uploaded but the final fetch failed.
    #[error("Failed to refetch remote cart: {0}")]
    Refetch(#[source] GatewayError),
}

impl SyncError {
    /// The gateway error behind this failure.
    #[must_use]
    pub const fn gateway_error(&self) -> &GatewayError {
        match self {
            Self::Fetch(e) | Self::Refetch(e) | Self::Upload { source: e, .. } => e,
        }
    }

    /// Whether the guest cart is still in the local store.
    #[must_use]
    pub const fn local_cart_retained(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Upload { .. })
    }
}

/// Errors returned by [`CartService`](crate::CartService) operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart has not been started yet.
    #[error("Cart is not loaded yet")]
    NotReady,

    /// A mutation arrived during the login drain and the engine is
    /// configured to reject it.
    #[error("Cart is syncing with the server, try again shortly")]
    Syncing,

    /// Quantity outside the accepted range for the operation.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// The login drain failed; the cart fell back to an empty server view.
    #[error("Cart sync failed: {0}")]
    Sync(#[source] Arc<SyncError>),

    /// Reloading the server cart failed; the cart fell back to empty.
    #[error("Cart API error: {0}")]
    Remote(#[from] GatewayError),
}

impl From<SyncError> for CartError {
    fn from(err: SyncError) -> Self {
        Self::Sync(Arc::new(err))
    }
}
