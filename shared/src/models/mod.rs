//! Domain models for the Storefront Platform

mod cart;
mod coupon;
mod product;
mod stock;

pub use cart::*;
pub use coupon::*;
pub use product::*;
pub use stock::*;
