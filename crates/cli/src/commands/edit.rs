//! Cart edits.
//!
//! In an authenticated session each edit waits for its remote write, so the
//! process does not exit with the change still in flight.

use edustore_cart::{CartService, Mutation, PendingWrite, WriteOutcome};
use edustore_core::{ItemId, LineChange};

use super::CommandError;

/// One cart edit requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Add { item: String, quantity: u32 },
    Decrement { item: String },
    Set { item: String, quantity: u32 },
    Remove { item: String },
    Clear,
}

impl Edit {
    /// Apply the edit and wait for the remote write, if any.
    pub async fn apply(self, cart: &CartService) -> Result<(), CommandError> {
        match self {
            Self::Add { item, quantity } => {
                let mutation = cart
                    .apply_delta(&ItemId::new(item), i64::from(quantity))
                    .await?;
                settle(mutation).await
            }
            Self::Decrement { item } => {
                let mutation = cart.decrement(&ItemId::new(item)).await?;
                settle(mutation).await
            }
            Self::Set { item, quantity } => {
                let mutation = cart.set_quantity(&ItemId::new(item), quantity).await?;
                settle(mutation).await
            }
            Self::Remove { item } => {
                let item_id = ItemId::new(item);
                let mutation = cart.remove_line(&item_id).await?;
                if mutation.change == LineChange::Unchanged {
                    tracing::info!(item_id = %item_id, "Item not in cart, nothing to remove");
                }
                settle(mutation).await
            }
            Self::Clear => match cart.clear().await? {
                Some(write) => check(write).await,
                None => Ok(()),
            },
        }
    }
}

async fn settle(mutation: Mutation) -> Result<(), CommandError> {
    match mutation.write {
        Some(write) => check(write).await,
        None => Ok(()),
    }
}

async fn check(write: PendingWrite) -> Result<(), CommandError> {
    match write.outcome().await {
        WriteOutcome::Failed(error) => Err(CommandError::WriteFailed(error)),
        WriteOutcome::Applied | WriteOutcome::Superseded | WriteOutcome::Aborted => Ok(()),
    }
}
