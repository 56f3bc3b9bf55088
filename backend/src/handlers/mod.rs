//! HTTP request handlers

mod health;
mod movements;
mod purchase_orders;
mod stock;

pub use health::*;
pub use movements::*;
pub use purchase_orders::*;
pub use stock::*;
