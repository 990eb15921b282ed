//! Edustore Core - Shared cart types.
//!
//! This crate provides the types shared by every Edustore component:
//! - `cart` - Cart synchronization engine (local store, gateway, reconciliation)
//! - `cli` - Command-line cart consumer
//!
//! # Architecture
//!
//! The core crate contains only types and pure cart arithmetic - no I/O, no
//! storage, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Item/line keys, cart lines and snapshots, prices, session mode

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
