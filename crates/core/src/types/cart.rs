//! Cart lines and snapshots.
//!
//! A [`CartSnapshot`] holds at most one [`CartLine`] per [`ItemId`] and never
//! stores a line with a quantity of zero: every mutation that would drive a
//! quantity to zero or below removes the line instead.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ItemId, LineId};
use super::price::{CurrencyCode, Price};

/// Product details the remote cart embeds in its lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    /// Display title.
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unit selling price in the store currency.
    #[serde(
        default,
        alias = "selling_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub selling_price: Option<Decimal>,
}

/// One entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product reference; the identity key of the line.
    #[serde(alias = "item_id", alias = "lab_manual_id")]
    pub item_id: ItemId,
    /// Positive quantity.
    pub quantity: u32,
    /// Line id assigned by the remote cart, once known.
    #[serde(
        default,
        rename = "lineId",
        alias = "line_id",
        alias = "cart_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_line_id: Option<LineId>,
    /// Product details, when the remote cart embeds them.
    #[serde(
        default,
        alias = "lab_manuals",
        skip_serializing_if = "Option::is_none"
    )]
    pub product: Option<ProductSummary>,
}

impl CartLine {
    /// Create a line that the remote cart does not know about yet.
    #[must_use]
    pub const fn new(item_id: ItemId, quantity: u32) -> Self {
        Self {
            item_id,
            quantity,
            server_line_id: None,
            product: None,
        }
    }

    /// Attach the server-assigned line id.
    #[must_use]
    pub fn with_server_line_id(mut self, line_id: LineId) -> Self {
        self.server_line_id = Some(line_id);
        self
    }

    /// Attach product details.
    #[must_use]
    pub fn with_product(mut self, product: ProductSummary) -> Self {
        self.product = Some(product);
        self
    }

    /// Line total, if the unit price is known.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.product
            .as_ref()
            .and_then(|p| p.selling_price)
            .map(|price| price * Decimal::from(self.quantity))
    }
}

/// What a mutation did to a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    /// A new line was appended.
    Created { quantity: u32 },
    /// An existing line's quantity changed.
    Updated { from: u32, to: u32 },
    /// The line was removed; carries the removed line.
    Removed(CartLine),
    /// Nothing changed (e.g., removing an absent item).
    Unchanged,
}

impl LineChange {
    /// Quantity of the line after the change (zero when absent).
    #[must_use]
    pub const fn resulting_quantity(&self) -> u32 {
        match self {
            Self::Created { quantity } => *quantity,
            Self::Updated { to, .. } => *to,
            Self::Removed(_) | Self::Unchanged => 0,
        }
    }

    /// True unless the change is [`LineChange::Unchanged`].
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Ordered collection of cart lines keyed by item id.
///
/// Deserialization normalizes the input: duplicate item ids are merged into
/// the first occurrence (quantities summed) and zero-quantity lines dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a snapshot from raw lines, enforcing the snapshot invariants.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut snapshot = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match snapshot.position(&line.item_id) {
                Some(index) => {
                    if let Some(existing) = snapshot.lines.get_mut(index) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                        if existing.server_line_id.is_none() {
                            existing.server_line_id = line.server_line_id;
                        }
                        if existing.product.is_none() {
                            existing.product = line.product;
                        }
                    }
                }
                None => snapshot.lines.push(line),
            }
        }
        snapshot
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Consume the snapshot into its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up the line for an item.
    #[must_use]
    pub fn get(&self, item_id: &ItemId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.item_id == item_id)
    }

    /// True if the item has a line.
    #[must_use]
    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.get(item_id).is_some()
    }

    /// Quantity of the item, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, item_id: &ItemId) -> u32 {
        self.get(item_id).map_or(0, |line| line.quantity)
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `selling_price * quantity` over lines with a known price.
    ///
    /// Lines without product data contribute nothing.
    #[must_use]
    pub fn subtotal(&self, currency_code: CurrencyCode) -> Price {
        let amount = self
            .lines
            .iter()
            .filter_map(CartLine::line_total)
            .fold(Decimal::ZERO, |acc, total| acc + total);
        Price::new(amount, currency_code)
    }

    /// Add `delta` to the item's quantity.
    ///
    /// Creates the line when absent and `delta > 0`; removes it when the
    /// resulting quantity is zero or below.
    pub fn apply_delta(&mut self, item_id: &ItemId, delta: i64) -> LineChange {
        let current = i64::from(self.quantity_of(item_id));
        let target = current.saturating_add(delta);
        if target <= 0 {
            return self.remove(item_id);
        }
        let quantity = u32::try_from(target).unwrap_or(u32::MAX);
        self.set_quantity(item_id, quantity)
    }

    /// Overwrite the item's quantity; zero removes the line.
    pub fn set_quantity(&mut self, item_id: &ItemId, quantity: u32) -> LineChange {
        if quantity == 0 {
            return self.remove(item_id);
        }
        match self.lines.iter_mut().find(|line| &line.item_id == item_id) {
            Some(line) if line.quantity == quantity => LineChange::Unchanged,
            Some(line) => {
                let from = line.quantity;
                line.quantity = quantity;
                LineChange::Updated { from, to: quantity }
            }
            None => {
                self.lines.push(CartLine::new(item_id.clone(), quantity));
                LineChange::Created { quantity }
            }
        }
    }

    /// Remove the item's line, if any.
    pub fn remove(&mut self, item_id: &ItemId) -> LineChange {
        match self.position(item_id) {
            Some(index) => LineChange::Removed(self.lines.remove(index)),
            None => LineChange::Unchanged,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn position(&self, item_id: &ItemId) -> Option<usize> {
        self.lines.iter().position(|line| &line.item_id == item_id)
    }
}

impl From<Vec<CartLine>> for CartSnapshot {
    fn from(lines: Vec<CartLine>) -> Self {
        Self::from_lines(lines)
    }
}

impl From<CartSnapshot> for Vec<CartLine> {
    fn from(snapshot: CartSnapshot) -> Self {
        snapshot.lines
    }
}

impl FromIterator<CartLine> for CartSnapshot {
    fn from_iter<T: IntoIterator<Item = CartLine>>(iter: T) -> Self {
        Self::from_lines(iter)
    }
}
