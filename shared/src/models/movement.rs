//! Stock movement models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Condition;
use crate::error::LedgerError;

/// Reference type stamped on movements posted by purchase-order receipts
pub const PURCHASE_ORDER_ITEM_REFERENCE: &str = "purchase_order_item";

/// Cause of a stock quantity change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Issue,
    Receipt,
    Transfer,
    Adjustment,
    Scrap,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Issue => "issue",
            MovementType::Receipt => "receipt",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
            MovementType::Scrap => "scrap",
        }
    }

    /// Turn the caller's quantity into the per-compartment deltas to apply.
    ///
    /// Issue, scrap, receipt and transfer take a positive magnitude and the
    /// sign comes from the type. Adjustment takes a signed, non-zero delta.
    pub fn plan(self, quantity: Decimal) -> Result<Vec<MovementLeg>, LedgerError> {
        if quantity.is_zero() {
            return Err(LedgerError::InvalidQuantity(
                "quantity must not be zero".to_string(),
            ));
        }

        if self != MovementType::Adjustment && quantity < Decimal::ZERO {
            return Err(LedgerError::InvalidQuantity(format!(
                "{} quantity must be positive, sign is implied by the movement type",
                self
            )));
        }

        let legs = match self {
            MovementType::Issue | MovementType::Scrap => {
                vec![MovementLeg::source(-quantity)]
            }
            MovementType::Receipt | MovementType::Adjustment => {
                vec![MovementLeg::source(quantity)]
            }
            MovementType::Transfer => vec![
                MovementLeg::source(-quantity),
                MovementLeg {
                    side: LegSide::Destination,
                    delta: quantity,
                },
            ],
        };

        Ok(legs)
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(MovementType::Issue),
            "receipt" => Ok(MovementType::Receipt),
            "transfer" => Ok(MovementType::Transfer),
            "adjustment" => Ok(MovementType::Adjustment),
            "scrap" => Ok(MovementType::Scrap),
            other => Err(LedgerError::InvalidMovementType(other.to_string())),
        }
    }
}

/// Which storage row a leg applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    /// The row named by the caller
    Source,
    /// The same item in the transfer's destination compartment
    Destination,
}

/// One signed quantity change against one storage row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementLeg {
    pub side: LegSide,
    pub delta: Decimal,
}

impl MovementLeg {
    fn source(delta: Decimal) -> Self {
        Self {
            side: LegSide::Source,
            delta,
        }
    }
}

/// Source and destination compartments of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEndpoints {
    pub from_compartment_id: Uuid,
    pub to_compartment_id: Uuid,
}

impl TransferEndpoints {
    pub fn from_options(from: Option<Uuid>, to: Option<Uuid>) -> Result<Self, LedgerError> {
        let from_compartment_id =
            from.ok_or(LedgerError::MissingTransferEndpoint("from_compartment_id"))?;
        let to_compartment_id =
            to.ok_or(LedgerError::MissingTransferEndpoint("to_compartment_id"))?;

        if from_compartment_id == to_compartment_id {
            return Err(LedgerError::TransferToSameCompartment);
        }

        Ok(Self {
            from_compartment_id,
            to_compartment_id,
        })
    }
}

/// Link from a movement to the object that triggered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl MovementReference {
    pub fn purchase_order_item(line_id: Uuid) -> Self {
        Self {
            reference_type: PURCHASE_ORDER_ITEM_REFERENCE.to_string(),
            reference_id: line_id,
        }
    }
}

/// An immutable record of one stock quantity change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub storage_item_id: Uuid,
    pub movement_type: MovementType,
    pub condition: Condition,
    /// Signed change applied to this row
    pub quantity: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub from_compartment_id: Option<Uuid>,
    pub to_compartment_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub performed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// A movement row is consistent when its snapshots differ by exactly its quantity
    pub fn is_balanced(&self) -> bool {
        self.quantity_after - self.quantity_before == self.quantity
    }
}
