//! Sequencing of background writes to the remote cart.
//!
//! Every authenticated mutation takes a [`WriteTicket`]: a per-item monotonic
//! sequence number plus the session epoch it was issued in. Writes for one
//! item are serialized through a per-item async lock, and a write only goes
//! out if its ticket is still the latest for that item when it gets the lock.
//! Superseded writes are skipped, and a response whose ticket went stale
//! while the request was in flight is discarded.
//!
//! Clearing the cart advances the epoch, which supersedes every earlier
//! ticket. A remote clear holds the write barrier exclusively, so it never
//! interleaves with an in-flight line write, and line writes of the new epoch
//! wait until that clear has finished.
//!
//! Session transitions never supersede writes. They wait until the sequencer
//! is idle ([`WriteSequencer::wait_idle`]) so every latest intent reaches the
//! remote cart before it is re-fetched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use edustore_core::ItemId;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, watch};
use tokio::task::JoinHandle;

use crate::gateway::GatewayError;

/// Result of one background write.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The remote cart accepted the write and it is still the latest intent.
    Applied,
    /// A newer intent replaced this one; it was skipped or its response discarded.
    Superseded,
    /// The remote call failed. The optimistic local state is kept.
    Failed(Arc<GatewayError>),
    /// The write task was cancelled before completing.
    Aborted,
}

impl WriteOutcome {
    /// True for [`WriteOutcome::Applied`].
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// True for [`WriteOutcome::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Handle to a background write. Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    handle: JoinHandle<WriteOutcome>,
}

impl PendingWrite {
    pub(crate) const fn new(handle: JoinHandle<WriteOutcome>) -> Self {
        Self { handle }
    }

    /// Wait for the write to finish.
    pub async fn outcome(self) -> WriteOutcome {
        self.handle.await.unwrap_or(WriteOutcome::Aborted)
    }
}

/// Identity of one issued line write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WriteTicket {
    pub item_id: ItemId,
    pub seq: u64,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct SequencerState {
    epoch: u64,
    next_seq: u64,
    latest: HashMap<ItemId, u64>,
    pending: HashSet<ItemId>,
    clear_pending: bool,
    key_locks: HashMap<ItemId, Arc<tokio::sync::Mutex<()>>>,
}

impl SequencerState {
    fn is_idle(&self) -> bool {
        !self.clear_pending && self.pending.is_empty()
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub(crate) struct WriteSequencer {
    state: Mutex<SequencerState>,
    barrier: Arc<RwLock<()>>,
    epoch_done: watch::Sender<u64>,
    idle: watch::Sender<bool>,
}

impl WriteSequencer {
    pub fn new() -> Self {
        let (epoch_done, _) = watch::channel(0);
        let (idle, _) = watch::channel(true);
        Self {
            state: Mutex::new(SequencerState::default()),
            barrier: Arc::new(RwLock::new(())),
            epoch_done,
            idle,
        }
    }

    /// Publish idleness; called with the state lock held after every change.
    fn update_idle(&self, state: &SequencerState) {
        let idle = state.is_idle();
        self.idle.send_if_modified(|current| {
            let changed = *current != idle;
            *current = idle;
            changed
        });
    }

    /// Issue a ticket for a write to `item_id` in the current epoch.
    pub fn issue(&self, item_id: &ItemId) -> WriteTicket {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.latest.insert(item_id.clone(), seq);
        state.pending.insert(item_id.clone());
        self.update_idle(&state);
        WriteTicket {
            item_id: item_id.clone(),
            seq,
            epoch: state.epoch,
        }
    }

    /// Supersede every outstanding write for a remote clear. The returned
    /// epoch must be passed to [`WriteSequencer::finish_clear`].
    pub fn begin_clear(&self) -> u64 {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.latest.clear();
        state.pending.clear();
        state.clear_pending = true;
        self.update_idle(&state);
        state.epoch
    }

    pub fn finish_clear(&self, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.epoch == epoch {
                state.clear_pending = false;
                self.update_idle(&state);
            }
        }
        self.mark_epoch_done(epoch);
    }

    fn mark_epoch_done(&self, epoch: u64) {
        self.epoch_done.send_if_modified(|done| {
            if *done < epoch {
                *done = epoch;
                true
            } else {
                false
            }
        });
    }

    pub fn current_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Wait until the epoch-wide operation that opened `epoch` has finished.
    pub async fn wait_epoch_ready(&self, epoch: u64) {
        let mut done = self.epoch_done.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = done.wait_for(|done| *done >= epoch).await;
    }

    pub async fn shared_barrier(&self) -> OwnedRwLockReadGuard<()> {
        self.barrier.clone().read_owned().await
    }

    pub async fn exclusive_barrier(&self) -> OwnedRwLockWriteGuard<()> {
        self.barrier.clone().write_owned().await
    }

    pub fn key_lock(&self, item_id: &ItemId) -> KeyLock {
        self.state
            .lock()
            .key_locks
            .entry(item_id.clone())
            .or_default()
            .clone()
    }

    /// Hand back a lock taken with [`WriteSequencer::key_lock`]; the entry is
    /// dropped once no other write holds or waits on it.
    pub fn release_key_lock(&self, item_id: &ItemId, lock: KeyLock) {
        let mut state = self.state.lock();
        drop(lock);
        if state
            .key_locks
            .get(item_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            state.key_locks.remove(item_id);
        }
    }

    /// Whether `ticket` is still the latest intent for its item.
    pub fn is_current(&self, ticket: &WriteTicket) -> bool {
        let state = self.state.lock();
        state.epoch == ticket.epoch && state.latest.get(&ticket.item_id) == Some(&ticket.seq)
    }

    /// Record that the write for `ticket` finished; returns whether it was
    /// still current.
    pub fn complete(&self, ticket: &WriteTicket) -> bool {
        let mut state = self.state.lock();
        let current = state.epoch == ticket.epoch
            && state.latest.get(&ticket.item_id) == Some(&ticket.seq);
        if current {
            state.pending.remove(&ticket.item_id);
            self.update_idle(&state);
        }
        current
    }

    /// True while any latest intent has not been answered yet.
    pub fn has_pending(&self) -> bool {
        !self.state.lock().is_idle()
    }

    /// Wait until every latest intent, and any remote clear, has been
    /// answered.
    pub async fn wait_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}
