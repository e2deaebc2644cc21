//! Business logic services

pub mod alerts;
pub mod cart;
pub mod cart_merge;
pub mod cart_validation;
pub mod catalog;
pub mod reservation;
pub mod stock;

pub use alerts::AlertService;
pub use cart::CartService;
pub use cart_merge::CartMergeService;
pub use cart_validation::CartValidationService;
pub use catalog::CatalogService;
pub use reservation::ReservationService;
pub use stock::StockService;
