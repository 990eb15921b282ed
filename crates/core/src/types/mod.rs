//! Core types for Edustore.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;
pub mod session;

pub use cart::{CartLine, CartSnapshot, LineChange, ProductSummary};
pub use id::{ItemId, LineId, LineKey};
pub use price::{CurrencyCode, Price};
pub use session::SessionMode;
