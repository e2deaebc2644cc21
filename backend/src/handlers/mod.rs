//! HTTP handlers

pub mod cart;
pub mod health;
pub mod stock;

pub use cart::*;
pub use health::*;
pub use stock::*;
