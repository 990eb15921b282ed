//! Plain-text cart rendering.

use std::fmt::Write;

use edustore_cart::CartView;
use edustore_core::{CurrencyCode, Price};

/// Render the cart as aligned text lines followed by a summary.
pub fn cart(view: &CartView, currency: CurrencyCode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cart ({} session)", view.mode);

    if view.snapshot.is_empty() {
        out.push_str("  (empty)\n");
    }

    for line in view.snapshot.lines() {
        let title = line
            .product
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .unwrap_or_else(|| line.item_id.as_str());
        let total = line
            .line_total()
            .map_or_else(String::new, |total| Price::new(total, currency).display());
        let _ = writeln!(out, "  {title:<32} x{:<4} {total}", line.quantity);
    }

    let _ = write!(
        out,
        "Items: {}  Subtotal: {}",
        view.total_count(),
        view.snapshot.subtotal(currency)
    );
    if view.sync_pending {
        out.push_str("\nGuest cart not synced yet, run `edustore sync` to retry");
    }
    out
}

#[cfg(test)]
mod tests {
    use edustore_cart::CartPhase;
    use edustore_core::{CartLine, CartSnapshot, ItemId, ProductSummary, SessionMode};
    use rust_decimal::Decimal;

    use super::*;

    fn view(snapshot: CartSnapshot) -> CartView {
        CartView {
            phase: CartPhase::Ready,
            mode: SessionMode::Guest,
            snapshot,
            sync_pending: false,
            writes_pending: false,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_render_empty_cart() {
        let out = cart(&view(CartSnapshot::new()), CurrencyCode::INR);
        assert!(out.contains("(empty)"));
        assert!(out.ends_with("Items: 0  Subtotal: ₹0.00"));
    }

    #[test]
    fn test_render_lines_with_prices() {
        let snapshot = CartSnapshot::from_lines(vec![
            CartLine::new(ItemId::new("lab-1"), 2).with_product(ProductSummary {
                title: Some("Physics Lab Manual".to_string()),
                selling_price: Some(Decimal::new(1999, 2)),
            }),
            CartLine::new(ItemId::new("lab-2"), 1),
        ]);

        let out = cart(&view(snapshot), CurrencyCode::INR);
        assert!(out.contains("Physics Lab Manual"));
        assert!(out.contains("₹39.98"));
        assert!(out.contains("lab-2"));
        assert!(out.ends_with("Items: 3  Subtotal: ₹39.98"));
    }
}
