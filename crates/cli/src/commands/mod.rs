//! Cart commands.
//!
//! Every command opens the cart the same way: the encrypted guest cart lives
//! in a [`FileStore`] at `EDUSTORE_STORE_PATH`, the account cart behind
//! [`HttpCartGateway`]. The session is authenticated iff
//! `EDUSTORE_SESSION_TOKEN` is set.

pub mod edit;
pub mod render;
pub mod session;

use std::sync::Arc;

use edustore_cart::{
    CartCipher, CartConfig, CartError, CartService, EncryptedCartStore, FileStore, GatewayError,
    HttpCartGateway,
};
use thiserror::Error;

use crate::Commands;
use edit::Edit;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The HTTP client could not be built.
    #[error("Cart API client error: {0}")]
    Gateway(#[from] GatewayError),

    /// The cart rejected the operation.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// The remote cart did not accept a write.
    #[error("Cart API rejected the change: {0}")]
    WriteFailed(Arc<GatewayError>),

    /// The command needs an authenticated session.
    #[error("Not logged in: set EDUSTORE_SESSION_TOKEN")]
    NotLoggedIn,
}

/// Run one command and return what to print.
pub async fn run(command: Commands, config: CartConfig) -> Result<String, CommandError> {
    let cart = open(&config)?;

    let edit = match command {
        Commands::Sync => return session::sync(&cart, &config).await,
        Commands::Logout => return session::logout(&cart, &config).await,
        Commands::Show => None,
        Commands::Add { item, quantity } => Some(Edit::Add { item, quantity }),
        Commands::Inc { item } => Some(Edit::Add { item, quantity: 1 }),
        Commands::Dec { item } => Some(Edit::Decrement { item }),
        Commands::Set { item, quantity } => Some(Edit::Set { item, quantity }),
        Commands::Remove { item } => Some(Edit::Remove { item }),
        Commands::Clear => Some(Edit::Clear),
    };

    session::start(&cart, &config).await?;
    if let Some(edit) = edit {
        edit.apply(&cart).await?;
    }
    Ok(render::cart(&cart.view(), config.engine.currency))
}

/// Build the cart service from configuration. Does not load anything yet.
pub fn open(config: &CartConfig) -> Result<CartService, CommandError> {
    let store = EncryptedCartStore::new(
        Arc::new(FileStore::new(&config.store_path)),
        CartCipher::from_secret(&config.cart_secret),
        config.cart_key.clone(),
    );
    let gateway = Arc::new(HttpCartGateway::from_config(config)?);
    Ok(CartService::new(config.engine, store, gateway))
}
