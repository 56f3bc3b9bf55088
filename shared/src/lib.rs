//! Shared types and domain rules for the Shop Floor Inventory service
//!
//! This crate holds the pure stock and procurement logic used by the backend
//! and by the browser build (via WASM). Nothing in here performs I/O.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
