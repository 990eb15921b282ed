//! Reconciliation engine.
//!
//! [`CartService`] owns the in-memory cart and decides where each mutation
//! goes:
//!
//! - **Guest**: the full snapshot is re-encrypted into the local store after
//!   every change
//! - **Authenticated**: the change is applied optimistically and the matching
//!   remote write runs in the background as a [`PendingWrite`]. Only the
//!   latest intent per item is sent; older ones are skipped
//! - **Login**: the guest cart is drained into the server cart. Items the
//!   server already has are left alone (the server wins), the rest are
//!   uploaded, the local store is cleared and the server cart is re-fetched
//! - **Logout**: the authenticated view is dropped and the engine returns to
//!   an empty guest cart
//!
//! Session transitions (start, login, logout, reload, sync retry) are
//! serialized, and each one waits for outstanding remote writes to land
//! before it reads or drops the server cart. Mutations issued while the
//! engine is loading or syncing wait for `Ready` or are rejected, depending
//! on [`SyncMutationPolicy`].
//!
//! State changes are published on a `watch` channel ([`CartService::subscribe`])
//! and failures the caller may want to surface go out on a `broadcast`
//! channel ([`CartService::notices`]).

mod view;
mod writes;


pub use view::{CartNotice, CartPhase, CartView, SyncReport};
pub use writes::{PendingWrite, WriteOutcome};

use std::sync::Arc;

use chrono::Utc;
use edustore_core::{CartSnapshot, ItemId, LineChange, LineKey, Price, SessionMode};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::AuthSignal;
use crate::config::{EngineConfig, SyncMutationPolicy, SyncRetryPolicy};
use crate::error::{CartError, SyncError};
use crate::gateway::CartGateway;
use crate::store::{DecodeResult, EncryptedCartStore};
use writes::{WriteSequencer, WriteTicket};

const NOTICE_CAPACITY: usize = 64;

/// Result of a cart mutation.
#[derive(Debug)]
pub struct Mutation {
    /// What happened to the line.
    pub change: LineChange,
    /// Cart item count after the mutation.
    pub total_count: u64,
    /// Background remote write, for authenticated sessions.
    pub write: Option<PendingWrite>,
}

impl Mutation {
    /// Wait for the background write, if any.
    pub async fn settled(self) -> Option<WriteOutcome> {
        match self.write {
            Some(write) => Some(write.outcome().await),
            None => None,
        }
    }
}

/// The remote call a line change maps to.
#[derive(Debug)]
enum RemoteWrite {
    Upsert(u32),
    Delete(LineKey),
}

impl RemoteWrite {
    fn for_change(item_id: &ItemId, change: &LineChange) -> Option<Self> {
        match change {
            LineChange::Created { quantity } | LineChange::Updated { to: quantity, .. } => {
                Some(Self::Upsert(*quantity))
            }
            LineChange::Removed(line) => Some(Self::Delete(LineKey::for_line(
                item_id,
                line.server_line_id.as_ref(),
            ))),
            LineChange::Unchanged => None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    phase: CartPhase,
    mode: SessionMode,
    snapshot: CartSnapshot,
    sync_pending: bool,
}

struct Inner {
    config: EngineConfig,
    store: EncryptedCartStore,
    gateway: Arc<dyn CartGateway>,
    state: Mutex<EngineState>,
    transitions: tokio::sync::Mutex<()>,
    writes: WriteSequencer,
    view: watch::Sender<CartView>,
    notices: broadcast::Sender<CartNotice>,
}

impl Inner {
    fn publish(&self) {
        let state = self.state.lock();
        self.publish_locked(&state);
    }

    fn publish_locked(&self, state: &EngineState) {
        self.view.send_replace(CartView {
            phase: state.phase,
            mode: state.mode,
            snapshot: state.snapshot.clone(),
            sync_pending: state.sync_pending,
            writes_pending: self.writes.has_pending(),
            updated_at: Utc::now(),
        });
    }

    fn set_phase(&self, phase: CartPhase, mode: SessionMode) {
        let mut state = self.state.lock();
        state.phase = phase;
        state.mode = mode;
        self.publish_locked(&state);
    }

    /// Finish a transition: install `snapshot` and become `Ready`.
    fn settle(&self, snapshot: CartSnapshot, sync_pending: bool) {
        let mut state = self.state.lock();
        state.snapshot = snapshot;
        state.sync_pending = sync_pending;
        state.phase = CartPhase::Ready;
        self.publish_locked(&state);
    }

    fn notify(&self, notice: CartNotice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    fn persist_guest(&self, snapshot: &CartSnapshot) {
        if let Err(e) = self.store.save(snapshot) {
            error!(error = %e, "Failed to persist guest cart");
        }
    }

    fn clear_local(&self) {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear stored guest cart");
        }
    }
}

/// Handle to the cart engine.
///
/// Cheaply cloneable; clones share the same cart.
#[derive(Clone)]
pub struct CartService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CartService")
            .field("phase", &state.phase)
            .field("mode", &state.mode)
            .field("lines", &state.snapshot.len())
            .finish_non_exhaustive()
    }
}

impl CartService {
    /// Create an engine in the `Uninitialized` phase. Call
    /// [`CartService::start`] before mutating.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: EncryptedCartStore,
        gateway: Arc<dyn CartGateway>,
    ) -> Self {
        let (view, _) = watch::channel(CartView::initial());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                gateway,
                state: Mutex::new(EngineState::default()),
                transitions: tokio::sync::Mutex::new(()),
                writes: WriteSequencer::new(),
                view,
                notices,
            }),
        }
    }

    // =========================================================================
    // Session transitions
    // =========================================================================

    /// Load the initial cart for the given session mode.
    ///
    /// Equivalent to the first [`CartService::set_authenticated`] call.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Sync`] if starting authenticated and draining the
    /// stored guest cart fails. The engine is `Ready` either way.
    pub async fn start(&self, authenticated: bool) -> Result<(), CartError> {
        self.set_authenticated(authenticated).await
    }

    /// React to the session mode signal.
    ///
    /// Guest to authenticated runs the login drain exactly once; authenticated
    /// to guest discards the server view. Repeating the current mode is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Sync`] if the login drain fails. The engine falls
    /// back to `Ready` with an empty authenticated cart.
    #[instrument(skip(self))]
    pub async fn set_authenticated(&self, authenticated: bool) -> Result<(), CartError> {
        let target = SessionMode::from_authenticated(authenticated);
        let _transition = self.inner.transitions.lock().await;
        let (phase, mode) = {
            let state = self.inner.state.lock();
            (state.phase, state.mode)
        };

        match (phase, target) {
            (CartPhase::Uninitialized, SessionMode::Guest) => {
                self.load_guest();
                Ok(())
            }
            (CartPhase::Uninitialized, SessionMode::Authenticated) => {
                self.inner
                    .set_phase(CartPhase::LoadingAuthenticated, SessionMode::Authenticated);
                self.sync().await
            }
            _ if mode == target => {
                debug!(mode = %mode, "Session mode unchanged");
                Ok(())
            }
            (_, SessionMode::Authenticated) => {
                info!("Login detected, syncing guest cart");
                self.sync().await
            }
            (_, SessionMode::Guest) => {
                info!("Logout detected, dropping authenticated cart");
                self.logout().await;
                Ok(())
            }
        }
    }

    /// Drive session transitions from an [`AuthSignal`].
    ///
    /// The current value is applied immediately, then every change. Sync
    /// failures are logged and reported through [`CartService::notices`].
    pub fn spawn_auth_listener(&self, signal: &AuthSignal) -> JoinHandle<()> {
        let mut rx = signal.subscribe();
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                let authenticated = *rx.borrow_and_update();
                if let Err(e) = service.set_authenticated(authenticated).await {
                    warn!(error = %e, "Session transition finished with errors");
                }
                if rx.changed().await.is_err() {
                    debug!("Auth signal dropped, stopping listener");
                    break;
                }
            }
        })
    }

    /// Reload the cart from its source of truth.
    ///
    /// Guest: re-read the local store. Authenticated: re-run a failed login
    /// drain under [`SyncRetryPolicy::RetryOnLoad`], otherwise re-fetch the
    /// server cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotReady`] before [`CartService::start`],
    /// [`CartError::Sync`] if a retried drain fails and
    /// [`CartError::Remote`] if the fetch fails.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<(), CartError> {
        let _transition = self.inner.transitions.lock().await;
        let (phase, mode, sync_pending) = {
            let state = self.inner.state.lock();
            (state.phase, state.mode, state.sync_pending)
        };
        if phase == CartPhase::Uninitialized {
            return Err(CartError::NotReady);
        }

        match mode {
            SessionMode::Guest => {
                self.load_guest();
                Ok(())
            }
            SessionMode::Authenticated
                if sync_pending && self.inner.config.sync_retry == SyncRetryPolicy::RetryOnLoad =>
            {
                info!("Retrying pending cart sync");
                self.sync().await
            }
            SessionMode::Authenticated => self.refresh_remote(sync_pending).await,
        }
    }

    /// Re-run the login drain.
    ///
    /// Safe to call after a successful drain: the local store is empty then
    /// and the server cart is only re-fetched.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotReady`] unless the engine is `Ready` and
    /// authenticated, and [`CartError::Sync`] if the drain fails again.
    #[instrument(skip(self))]
    pub async fn retry_sync(&self) -> Result<(), CartError> {
        let _transition = self.inner.transitions.lock().await;
        let (phase, mode) = {
            let state = self.inner.state.lock();
            (state.phase, state.mode)
        };
        if phase != CartPhase::Ready || mode != SessionMode::Authenticated {
            return Err(CartError::NotReady);
        }
        self.sync().await
    }

    fn load_guest(&self) {
        self.inner
            .set_phase(CartPhase::LoadingGuest, SessionMode::Guest);

        let loaded = self.inner.store.load();
        if loaded.is_corrupted() {
            self.inner.notify(CartNotice::LocalCartCorrupted);
        }
        let snapshot = loaded.into_snapshot();
        info!(lines = snapshot.len(), "Loaded guest cart");
        self.inner.settle(snapshot, false);
    }

    /// Wait until every write issued before the current transition has been
    /// answered. The phase is busy by now, so no new writes are issued.
    async fn flush_writes(&self) {
        if self.inner.writes.has_pending() {
            debug!("Waiting for pending cart writes");
            self.inner.writes.wait_idle().await;
        }
    }

    async fn sync(&self) -> Result<(), CartError> {
        self.inner
            .set_phase(CartPhase::Syncing, SessionMode::Authenticated);
        self.flush_writes().await;

        match self.drain().await {
            Ok((snapshot, report)) => {
                info!(
                    uploaded = report.uploaded.len(),
                    skipped = report.skipped.len(),
                    lines = snapshot.len(),
                    "Cart sync completed"
                );
                self.inner.settle(snapshot, false);
                self.inner.notify(CartNotice::SyncCompleted(report));
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    local_cart_retained = e.local_cart_retained(),
                    "Cart sync failed, falling back to empty cart"
                );
                self.inner.settle(CartSnapshot::new(), true);
                let e = Arc::new(e);
                self.inner.notify(CartNotice::SyncFailed(e.clone()));
                Err(CartError::Sync(e))
            }
        }
    }

    /// Push the stored guest cart into the server cart.
    async fn drain(&self) -> Result<(CartSnapshot, SyncReport), SyncError> {
        let mut report = SyncReport::default();
        let local = match self.inner.store.load() {
            DecodeResult::Corrupted => {
                report.local_corrupted = true;
                self.inner.notify(CartNotice::LocalCartCorrupted);
                self.inner.clear_local();
                CartSnapshot::new()
            }
            loaded => loaded.into_snapshot(),
        };

        let server = self
            .inner
            .gateway
            .fetch_all()
            .await
            .map_err(SyncError::Fetch)?;
        if local.is_empty() {
            return Ok((server, report));
        }

        for line in local.lines() {
            if server.contains(&line.item_id) {
                debug!(
                    item_id = %line.item_id,
                    "Item already in server cart, keeping server quantity"
                );
                report.skipped.push(line.item_id.clone());
                continue;
            }
            self.inner
                .gateway
                .upsert(&line.item_id, line.quantity)
                .await
                .map_err(|source| SyncError::Upload {
                    item_id: line.item_id.clone(),
                    source,
                })?;
            report.uploaded.push(line.item_id.clone());
        }

        self.inner.clear_local();
        if report.uploaded.is_empty() {
            return Ok((server, report));
        }

        let fresh = self
            .inner
            .gateway
            .fetch_all()
            .await
            .map_err(SyncError::Refetch)?;
        Ok((fresh, report))
    }

    async fn logout(&self) {
        self.inner
            .set_phase(CartPhase::LoadingGuest, SessionMode::Guest);
        self.flush_writes().await;
        self.inner.clear_local();
        let mut state = self.inner.state.lock();
        state.mode = SessionMode::Guest;
        state.snapshot.clear();
        state.sync_pending = false;
        state.phase = CartPhase::Ready;
        self.inner.publish_locked(&state);
    }

    async fn refresh_remote(&self, sync_pending: bool) -> Result<(), CartError> {
        self.inner
            .set_phase(CartPhase::LoadingAuthenticated, SessionMode::Authenticated);
        self.flush_writes().await;
        match self.inner.gateway.fetch_all().await {
            Ok(snapshot) => {
                self.inner.settle(snapshot, sync_pending);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to reload server cart, falling back to empty cart");
                self.inner.settle(CartSnapshot::new(), sync_pending);
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `delta` to the item's quantity.
    ///
    /// Creates the line for a positive delta; removes it when the quantity
    /// reaches zero.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotReady`] before [`CartService::start`] and
    /// [`CartError::Syncing`] during a login drain under
    /// [`SyncMutationPolicy::Reject`].
    pub async fn apply_delta(&self, item_id: &ItemId, delta: i64) -> Result<Mutation, CartError> {
        self.mutate(item_id, |snapshot| snapshot.apply_delta(item_id, delta))
            .await
    }

    /// Add one to the item's quantity.
    ///
    /// # Errors
    ///
    /// See [`CartService::apply_delta`].
    pub async fn increment(&self, item_id: &ItemId) -> Result<Mutation, CartError> {
        self.apply_delta(item_id, 1).await
    }

    /// Subtract one from the item's quantity; the line goes away at zero.
    ///
    /// # Errors
    ///
    /// See [`CartService::apply_delta`].
    pub async fn decrement(&self, item_id: &ItemId) -> Result<Mutation, CartError> {
        self.apply_delta(item_id, -1).await
    }

    /// Set the item's quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for zero (use
    /// [`CartService::remove_line`]), otherwise see [`CartService::apply_delta`].
    pub async fn set_quantity(
        &self,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<Mutation, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.mutate(item_id, |snapshot| snapshot.set_quantity(item_id, quantity))
            .await
    }

    /// Remove the item's line. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// See [`CartService::apply_delta`].
    pub async fn remove_line(&self, item_id: &ItemId) -> Result<Mutation, CartError> {
        self.mutate(item_id, |snapshot| snapshot.remove(item_id))
            .await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// See [`CartService::apply_delta`].
    pub async fn clear(&self) -> Result<Option<PendingWrite>, CartError> {
        loop {
            self.wait_until_ready().await?;
            let cleared = {
                let mut state = self.inner.state.lock();
                if state.phase.is_ready() {
                    state.snapshot.clear();
                    let write = match state.mode {
                        SessionMode::Guest => {
                            self.inner.clear_local();
                            None
                        }
                        SessionMode::Authenticated => {
                            let epoch = self.inner.writes.begin_clear();
                            let handle = tokio::spawn(run_clear(self.inner.clone(), epoch));
                            Some(PendingWrite::new(handle))
                        }
                    };
                    self.inner.publish_locked(&state);
                    Some(write)
                } else {
                    None
                }
            };
            if let Some(write) = cleared {
                info!("Cart cleared");
                return Ok(write);
            }
        }
    }

    async fn mutate<F>(&self, item_id: &ItemId, op: F) -> Result<Mutation, CartError>
    where
        F: Fn(&mut CartSnapshot) -> LineChange,
    {
        loop {
            self.wait_until_ready().await?;
            let mutation = {
                let mut state = self.inner.state.lock();
                if state.phase.is_ready() {
                    Some(self.apply_locked(&mut state, item_id, &op))
                } else {
                    None
                }
            };
            if let Some(mutation) = mutation {
                return Ok(mutation);
            }
        }
    }

    fn apply_locked<F>(&self, state: &mut EngineState, item_id: &ItemId, op: &F) -> Mutation
    where
        F: Fn(&mut CartSnapshot) -> LineChange,
    {
        let change = op(&mut state.snapshot);
        let total_count = state.snapshot.total_count();

        let write = if change.is_change() {
            debug!(item_id = %item_id, change = ?change, mode = %state.mode, "Cart line changed");
            match state.mode {
                SessionMode::Guest => {
                    self.inner.persist_guest(&state.snapshot);
                    None
                }
                SessionMode::Authenticated => {
                    RemoteWrite::for_change(item_id, &change).map(|write| {
                        let ticket = self.inner.writes.issue(item_id);
                        PendingWrite::new(tokio::spawn(run_line_write(
                            self.inner.clone(),
                            ticket,
                            write,
                        )))
                    })
                }
            }
        } else {
            None
        };

        self.inner.publish_locked(state);
        Mutation {
            change,
            total_count,
            write,
        }
    }

    /// Resolve once mutations may be applied.
    async fn wait_until_ready(&self) -> Result<(), CartError> {
        let phase = self.inner.state.lock().phase;
        if phase.is_ready() {
            return Ok(());
        }
        if !phase.is_busy() {
            return Err(CartError::NotReady);
        }

        match self.inner.config.sync_mutations {
            SyncMutationPolicy::Reject => Err(CartError::Syncing),
            SyncMutationPolicy::Queue => {
                debug!(phase = %phase, "Queueing cart mutation until ready");
                let mut rx = self.inner.view.subscribe();
                // The sender lives in `inner`, which we hold.
                let _ = rx.wait_for(|view| !view.phase.is_busy()).await;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current cart contents.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.state.lock().snapshot.clone()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.inner.state.lock().snapshot.total_count()
    }

    /// Sum of line totals for lines with known prices.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.inner
            .state
            .lock()
            .snapshot
            .subtotal(self.inner.config.currency)
    }

    #[must_use]
    pub fn phase(&self) -> CartPhase {
        self.inner.state.lock().phase
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.inner.state.lock().mode
    }

    /// Whether a failed login drain is waiting for a retry.
    #[must_use]
    pub fn is_sync_pending(&self) -> bool {
        self.inner.state.lock().sync_pending
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> CartView {
        self.inner.view.borrow().clone()
    }

    /// Receiver of every published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.inner.view.subscribe()
    }

    /// Receiver of notices sent from now on.
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<CartNotice> {
        self.inner.notices.subscribe()
    }
}

async fn run_line_write(
    inner: Arc<Inner>,
    ticket: WriteTicket,
    write: RemoteWrite,
) -> WriteOutcome {
    inner.writes.wait_epoch_ready(ticket.epoch).await;
    let _barrier = inner.writes.shared_barrier().await;
    let key_lock = inner.writes.key_lock(&ticket.item_id);
    let outcome = {
        let _key = key_lock.lock().await;
        send_line_write(&inner, &ticket, &write).await
    };
    inner.writes.release_key_lock(&ticket.item_id, key_lock);
    inner.publish();
    outcome
}

/// Send one line write if its ticket is still current. Runs under the item's
/// key lock.
async fn send_line_write(inner: &Inner, ticket: &WriteTicket, write: &RemoteWrite) -> WriteOutcome {
    if !inner.writes.is_current(ticket) {
        debug!(
            item_id = %ticket.item_id,
            seq = ticket.seq,
            "Skipping superseded cart write"
        );
        return WriteOutcome::Superseded;
    }

    let result = match write {
        RemoteWrite::Upsert(quantity) => inner.gateway.upsert(&ticket.item_id, *quantity).await,
        RemoteWrite::Delete(key) => inner.gateway.delete(key).await,
    };
    let current = inner.writes.complete(ticket);

    match result {
        Ok(()) if current => WriteOutcome::Applied,
        Ok(()) => {
            debug!(
                item_id = %ticket.item_id,
                seq = ticket.seq,
                "Discarding stale cart write response"
            );
            WriteOutcome::Superseded
        }
        Err(e) => {
            let error = Arc::new(e);
            if current {
                error!(
                    item_id = %ticket.item_id,
                    error = %error,
                    write = ?write,
                    "Cart write failed"
                );
                inner.notify(CartNotice::WriteFailed {
                    item_id: Some(ticket.item_id.clone()),
                    retryable: error.is_retryable(),
                    error: error.clone(),
                });
            } else {
                debug!(
                    item_id = %ticket.item_id,
                    error = %error,
                    "Superseded cart write failed"
                );
            }
            WriteOutcome::Failed(error)
        }
    }
}

async fn run_clear(inner: Arc<Inner>, epoch: u64) -> WriteOutcome {
    let outcome = {
        let _barrier = inner.writes.exclusive_barrier().await;
        if inner.writes.current_epoch() == epoch {
            match inner.gateway.clear_all().await {
                Ok(()) => WriteOutcome::Applied,
                Err(e) => {
                    let error = Arc::new(e);
                    error!(error = %error, "Failed to clear remote cart");
                    inner.notify(CartNotice::WriteFailed {
                        item_id: None,
                        retryable: error.is_retryable(),
                        error: error.clone(),
                    });
                    WriteOutcome::Failed(error)
                }
            }
        } else {
            debug!(epoch, "Skipping superseded cart clear");
            WriteOutcome::Superseded
        }
    };
    inner.writes.finish_clear(epoch);
    inner.publish();
    outcome
}
