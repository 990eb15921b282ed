//! Observable engine state and notifications.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edustore_core::{CartSnapshot, ItemId, SessionMode};

use crate::error::SyncError;
use crate::gateway::GatewayError;

/// Lifecycle phase of the reconciliation engine.
///
/// ```text
/// Uninitialized -> LoadingGuest         -> Ready(guest)
/// Uninitialized -> LoadingAuthenticated -> Syncing -> Ready(authenticated)
/// Ready(guest)  -> Syncing              -> Ready(authenticated)   login
/// Ready(auth)   -> Ready(guest)                                   logout
/// Ready         -> Loading*             -> Ready                  reload
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CartPhase {
    #[default]
    Uninitialized,
    LoadingGuest,
    LoadingAuthenticated,
    Syncing,
    Ready,
}

impl CartPhase {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Phases in which mutations wait (or are rejected) rather than fail.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::LoadingGuest | Self::LoadingAuthenticated | Self::Syncing
        )
    }
}

impl fmt::Display for CartPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::LoadingGuest => "loading-guest",
            Self::LoadingAuthenticated => "loading-authenticated",
            Self::Syncing => "syncing",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the cart, published on every change.
#[derive(Debug, Clone)]
pub struct CartView {
    pub phase: CartPhase,
    pub mode: SessionMode,
    pub snapshot: CartSnapshot,
    /// A login drain failed and has not been retried successfully.
    pub sync_pending: bool,
    /// Background writes whose latest intent is still unanswered.
    pub writes_pending: bool,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    pub(crate) fn initial() -> Self {
        Self {
            phase: CartPhase::Uninitialized,
            mode: SessionMode::Guest,
            snapshot: CartSnapshot::new(),
            sync_pending: false,
            writes_pending: false,
            updated_at: Utc::now(),
        }
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.snapshot.total_count()
    }
}

/// Result of a successful login drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Guest lines pushed to the server.
    pub uploaded: Vec<ItemId>,
    /// Guest lines dropped because the server already had the item.
    pub skipped: Vec<ItemId>,
    /// The stored guest cart could not be read and was discarded.
    pub local_corrupted: bool,
}

impl SyncReport {
    /// True when nothing had to be uploaded.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.uploaded.is_empty()
    }
}

/// Events for UI feedback that are not part of the cart state itself.
#[derive(Debug, Clone)]
pub enum CartNotice {
    /// A background write failed. The optimistic state was kept; a reload
    /// shows the server's view.
    WriteFailed {
        /// `None` for a failed clear.
        item_id: Option<ItemId>,
        error: Arc<GatewayError>,
        retryable: bool,
    },
    /// The login drain finished.
    SyncCompleted(SyncReport),
    /// The login drain failed and the cart fell back to empty.
    SyncFailed(Arc<SyncError>),
    /// The stored guest cart was unreadable and treated as empty.
    LocalCartCorrupted,
}
