//! Shared types and domain math for the Storefront Platform
//!
//! This crate contains types shared between the backend services, their
//! tests, and any future API consumers: catalog/cart/stock enums, the money
//! representation, cart alert payloads, and the pure arithmetic behind
//! availability, merge clamping, and price-drift classification.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
