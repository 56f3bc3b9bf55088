//! Business logic services for the Shop Floor Inventory service

pub mod ledger;
pub mod movement;
pub mod order_number;
pub mod procurement;

pub use ledger::LedgerService;
pub use movement::MovementService;
pub use order_number::OrderNumberAllocator;
pub use procurement::ProcurementService;
