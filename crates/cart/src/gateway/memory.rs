//! In-process cart backend.
//!
//! Behaves like the remote cart (assigns line ids, tolerates deletes of
//! absent lines) and records every call. Failures and stalls can be injected
//! to exercise the engine's failure paths.

use std::collections::HashSet;

use async_trait::async_trait;
use edustore_core::{CartLine, CartSnapshot, ItemId, LineId, LineKey};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{CartGateway, GatewayError};

/// One call received by a [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    FetchAll,
    Upsert { item_id: ItemId, quantity: u32 },
    Delete(LineKey),
    ClearAll,
}

#[derive(Debug, Default)]
struct Failures {
    fetch: bool,
    writes: bool,
    upsert_items: HashSet<ItemId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    cart: CartSnapshot,
    next_line_id: u64,
    calls: Vec<GatewayCall>,
    failures: Failures,
}

/// In-memory implementation of [`CartGateway`].
#[derive(Debug)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    writes_open: watch::Sender<bool>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Create a gateway with an empty cart.
    #[must_use]
    pub fn new() -> Self {
        let (writes_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(MemoryState::default()),
            writes_open,
        }
    }

    /// Create a gateway whose cart already holds `lines`.
    ///
    /// Lines without a server id get one assigned.
    #[must_use]
    pub fn with_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.state.lock();
            let mut lines: Vec<CartLine> = lines.into_iter().collect();
            for line in &mut lines {
                if line.server_line_id.is_none() {
                    line.server_line_id = Some(next_line_id(&mut state.next_line_id));
                }
            }
            state.cart = CartSnapshot::from_lines(lines);
        }
        gateway
    }

    /// Current server-side cart.
    #[must_use]
    pub fn cart(&self) -> CartSnapshot {
        self.state.lock().cart.clone()
    }

    /// Calls received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of upsert calls received so far.
    #[must_use]
    pub fn upsert_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, GatewayCall::Upsert { .. }))
            .count()
    }

    /// Make `fetch_all` fail.
    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().failures.fetch = fail;
    }

    /// Make every write (`upsert`, `delete`, `clear_all`) fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().failures.writes = fail;
    }

    /// Make upserts of one item fail.
    pub fn fail_upserts_for(&self, item_id: ItemId) {
        self.state.lock().failures.upsert_items.insert(item_id);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        self.state.lock().failures = Failures::default();
    }

    /// Stall writes until [`MemoryGateway::release_writes`] is called.
    pub fn hold_writes(&self) {
        self.writes_open.send_replace(false);
    }

    /// Let stalled writes proceed.
    pub fn release_writes(&self) {
        self.writes_open.send_replace(true);
    }

    async fn wait_for_writes(&self) {
        let mut open = self.writes_open.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = open.wait_for(|open| *open).await;
    }

    fn record(&self, call: GatewayCall) -> parking_lot::MutexGuard<'_, MemoryState> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state
    }
}

fn next_line_id(counter: &mut u64) -> LineId {
    *counter += 1;
    LineId::new(format!("line-{counter}"))
}

fn injected(op: &str) -> GatewayError {
    GatewayError::Transport(format!("injected {op} failure"))
}

#[async_trait]
impl CartGateway for MemoryGateway {
    async fn fetch_all(&self) -> Result<CartSnapshot, GatewayError> {
        let state = self.record(GatewayCall::FetchAll);
        if state.failures.fetch {
            return Err(injected("fetch"));
        }
        Ok(state.cart.clone())
    }

    async fn upsert(&self, item_id: &ItemId, quantity: u32) -> Result<(), GatewayError> {
        self.wait_for_writes().await;
        let mut state = self.record(GatewayCall::Upsert {
            item_id: item_id.clone(),
            quantity,
        });
        if state.failures.writes || state.failures.upsert_items.contains(item_id) {
            return Err(injected("upsert"));
        }

        let existed = state.cart.contains(item_id);
        state.cart.set_quantity(item_id, quantity);
        if !existed {
            let line_id = next_line_id(&mut state.next_line_id);
            let lines: CartSnapshot = state
                .cart
                .clone()
                .into_lines()
                .into_iter()
                .map(|line| {
                    if &line.item_id == item_id {
                        line.with_server_line_id(line_id.clone())
                    } else {
                        line
                    }
                })
                .collect();
            state.cart = lines;
        }
        Ok(())
    }

    async fn delete(&self, key: &LineKey) -> Result<(), GatewayError> {
        self.wait_for_writes().await;
        let mut state = self.record(GatewayCall::Delete(key.clone()));
        if state.failures.writes {
            return Err(injected("delete"));
        }

        let target = match key {
            LineKey::Item(item_id) => Some(item_id.clone()),
            LineKey::Server(line_id) => state
                .cart
                .lines()
                .iter()
                .find(|line| line.server_line_id.as_ref() == Some(line_id))
                .map(|line| line.item_id.clone()),
        };
        if let Some(item_id) = target {
            state.cart.remove(&item_id);
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), GatewayError> {
        self.wait_for_writes().await;
        let mut state = self.record(GatewayCall::ClearAll);
        if state.failures.writes {
            return Err(injected("clear"));
        }
        state.cart.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_assigns_line_id_once() {
        let gateway = MemoryGateway::new();
        let item = ItemId::new("x");

        gateway.upsert(&item, 2).await.unwrap();
        gateway.upsert(&item, 5).await.unwrap();

        let cart = gateway.fetch_all().await.unwrap();
        let line = cart.get(&item).unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(line.server_line_id, Some(LineId::new("line-1")));
    }

    #[tokio::test]
    async fn test_delete_by_server_id_and_item_id() {
        let gateway = MemoryGateway::with_lines(vec![
            CartLine::new(ItemId::new("a"), 1),
            CartLine::new(ItemId::new("b"), 1),
        ]);

        gateway
            .delete(&LineKey::Server(LineId::new("line-1")))
            .await
            .unwrap();
        gateway.delete(&LineKey::Item(ItemId::new("b"))).await.unwrap();
        gateway.delete(&LineKey::Item(ItemId::new("zzz"))).await.unwrap();

        assert!(gateway.cart().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let gateway = MemoryGateway::new();
        gateway.fail_writes(true);
        assert!(gateway.upsert(&ItemId::new("x"), 1).await.is_err());
        assert!(gateway.cart().is_empty());

        gateway.heal();
        gateway.fail_upserts_for(ItemId::new("bad"));
        assert!(gateway.upsert(&ItemId::new("bad"), 1).await.is_err());
        assert!(gateway.upsert(&ItemId::new("good"), 1).await.is_ok());

        gateway.fail_fetches(true);
        assert!(gateway.fetch_all().await.is_err());
        assert_eq!(gateway.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_hold_and_release_writes() {
        let gateway = std::sync::Arc::new(MemoryGateway::new());
        gateway.hold_writes();

        let task = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.upsert(&ItemId::new("x"), 1).await })
        };
        tokio::task::yield_now().await;
        assert!(gateway.calls().is_empty());

        gateway.release_writes();
        task.await.unwrap().unwrap();
        assert_eq!(gateway.cart().quantity_of(&ItemId::new("x")), 1);
    }
}
