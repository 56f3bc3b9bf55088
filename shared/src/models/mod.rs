//! Domain models for the Shop Floor Inventory service

mod movement;
mod purchase_order;
mod storage;

pub use movement::*;
pub use purchase_order::*;
pub use storage::*;
