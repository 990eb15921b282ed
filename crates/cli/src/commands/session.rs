//! Session commands: start, sync and logout.

use edustore_cart::{CartConfig, CartError, CartService};

use super::{CommandError, render};

/// Load the cart for the configured session mode.
///
/// A failed login drain is not fatal here: the cart is usable (empty) and the
/// guest cart stays on disk for `edustore sync`.
pub async fn start(cart: &CartService, config: &CartConfig) -> Result<(), CommandError> {
    match cart.start(config.is_authenticated()).await {
        Ok(()) => Ok(()),
        Err(CartError::Sync(e)) => {
            tracing::warn!(error = %e, "Guest cart not synced yet, run `edustore sync` to retry");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Drain the stored guest cart into the account cart.
pub async fn sync(cart: &CartService, config: &CartConfig) -> Result<String, CommandError> {
    if !config.is_authenticated() {
        return Err(CommandError::NotLoggedIn);
    }
    cart.start(true).await?;
    tracing::info!(lines = cart.snapshot().len(), "Cart synced");
    Ok(render::cart(&cart.view(), config.engine.currency))
}

/// Run the logout transition: drop the account cart view and the stored
/// guest cart.
pub async fn logout(cart: &CartService, config: &CartConfig) -> Result<String, CommandError> {
    if !config.is_authenticated() {
        return Err(CommandError::NotLoggedIn);
    }
    // The drain may fail; logout discards its result either way.
    if let Err(e) = cart.start(true).await {
        tracing::warn!(error = %e, "Cart sync failed before logout");
    }
    cart.set_authenticated(false).await?;
    Ok(render::cart(&cart.view(), config.engine.currency))
}
