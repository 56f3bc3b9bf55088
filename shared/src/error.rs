//! Typed errors raised by the stock ledger and procurement rules

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Condition, PurchaseOrderStatus};

/// Broad class of a ledger error, used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any write
    Validation,
    /// Well-formed input that would break a business invariant
    InvariantViolation,
}

/// Errors produced by the pure domain rules
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // Validation errors
    #[error("Invalid movement type: {0}")]
    InvalidMovementType(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid item kind: {0}")]
    InvalidItemKind(String),

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Transfer requires {0}")]
    MissingTransferEndpoint(&'static str),

    #[error("Transfer source and destination compartments must differ")]
    TransferToSameCompartment,

    #[error("Weight for {condition} must be between 0 and 1, got {value}")]
    InvalidWeight { condition: Condition, value: Decimal },

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid unit price: {0}")]
    InvalidUnitPrice(String),

    // Invariant violations
    #[error("Insufficient {condition} stock: {available} available, {requested} requested")]
    InsufficientStock {
        condition: Condition,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Measuring equipment is tracked as a single unit: {0}")]
    SingletonViolation(String),

    #[error(
        "Line {line_number} over-receipt: ordered {ordered}, received {received}, attempted {attempted}"
    )]
    OverReceipt {
        line_number: i32,
        ordered: Decimal,
        received: Decimal,
        attempted: Decimal,
    },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    },

    #[error("Order in status {0} cannot receive goods")]
    OrderNotReceivable(PurchaseOrderStatus),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidMovementType(_)
            | LedgerError::InvalidCondition(_)
            | LedgerError::InvalidItemKind(_)
            | LedgerError::InvalidStatus(_)
            | LedgerError::InvalidQuantity(_)
            | LedgerError::MissingTransferEndpoint(_)
            | LedgerError::TransferToSameCompartment
            | LedgerError::InvalidWeight { .. }
            | LedgerError::InvalidThreshold(_)
            | LedgerError::InvalidUnitPrice(_) => ErrorKind::Validation,
            LedgerError::InsufficientStock { .. }
            | LedgerError::SingletonViolation(_)
            | LedgerError::OverReceipt { .. }
            | LedgerError::InvalidStatusTransition { .. }
            | LedgerError::OrderNotReceivable(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidMovementType(_) => "INVALID_MOVEMENT_TYPE",
            LedgerError::InvalidCondition(_) => "INVALID_CONDITION",
            LedgerError::InvalidItemKind(_) => "INVALID_ITEM_KIND",
            LedgerError::InvalidStatus(_) => "INVALID_STATUS",
            LedgerError::InvalidQuantity(_) => "INVALID_QUANTITY",
            LedgerError::MissingTransferEndpoint(_) => "MISSING_TRANSFER_ENDPOINT",
            LedgerError::TransferToSameCompartment => "INVALID_TRANSFER",
            LedgerError::InvalidWeight { .. } => "INVALID_WEIGHT",
            LedgerError::InvalidThreshold(_) => "INVALID_THRESHOLD",
            LedgerError::InvalidUnitPrice(_) => "INVALID_UNIT_PRICE",
            LedgerError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LedgerError::SingletonViolation(_) => "SINGLETON_VIOLATION",
            LedgerError::OverReceipt { .. } => "OVER_RECEIPT",
            LedgerError::InvalidStatusTransition { .. } => "INVALID_STATE_TRANSITION",
            LedgerError::OrderNotReceivable(_) => "ORDER_NOT_RECEIVABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_and_invariant_errors_are_distinguishable() {
        let validation = LedgerError::InvalidMovementType("borrow".to_string());
        let invariant = LedgerError::InsufficientStock {
            condition: Condition::New,
            available: Decimal::from(10),
            requested: Decimal::from(15),
        };

        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert_eq!(invariant.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = LedgerError::InsufficientStock {
            condition: Condition::Reground,
            available: Decimal::from(2),
            requested: Decimal::from(3),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient reground stock: 2 available, 3 requested"
        );
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }
}
