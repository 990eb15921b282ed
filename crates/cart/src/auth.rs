//! Session mode signal.
//!
//! The authentication layer owns an [`AuthSignal`] and flips it on login and
//! logout; the cart engine subscribes through
//! [`CartService::spawn_auth_listener`](crate::CartService::spawn_auth_listener).

use edustore_core::SessionMode;
use tokio::sync::watch;

/// Observable "is the user authenticated" flag.
#[derive(Debug, Clone)]
pub struct AuthSignal {
    tx: watch::Sender<bool>,
}

impl AuthSignal {
    /// Create a signal with the given initial value.
    #[must_use]
    pub fn new(authenticated: bool) -> Self {
        let (tx, _) = watch::channel(authenticated);
        Self { tx }
    }

    /// Update the flag. Subscribers are only woken when the value changes.
    pub fn set(&self, authenticated: bool) {
        self.tx.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        });
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        SessionMode::from_authenticated(self.is_authenticated())
    }

    /// Receiver that observes the current value and every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
