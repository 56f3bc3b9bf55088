//! Purchase order models, status machine and receipt reconciliation

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Condition;
use crate::error::LedgerError;
use crate::validation::MAX_AMOUNT;

/// Lifecycle status of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    Confirmed,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Sent => "sent",
            PurchaseOrderStatus::Confirmed => "confirmed",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }

    pub fn accepts_receipts(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Confirmed | PurchaseOrderStatus::PartiallyReceived
        )
    }

    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;

        match (self, next) {
            (Draft, Sent) => true,
            (Sent, Confirmed) => true,
            (Confirmed, PartiallyReceived) => true,
            (Confirmed, Received) => true,
            (PartiallyReceived, Received) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn transition_to(self, next: PurchaseOrderStatus) -> Result<Self, LedgerError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LedgerError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PurchaseOrderStatus::Draft),
            "sent" => Ok(PurchaseOrderStatus::Sent),
            "confirmed" => Ok(PurchaseOrderStatus::Confirmed),
            "partially_received" => Ok(PurchaseOrderStatus::PartiallyReceived),
            "received" => Ok(PurchaseOrderStatus::Received),
            "cancelled" => Ok(PurchaseOrderStatus::Cancelled),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

/// Human-readable purchase order identifier, `PO-<year>-<NNNN>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn format(year: i32, sequence: i64) -> Self {
        Self(format!("PO-{}-{:04}", year, sequence))
    }

    /// Split an order number into `(year, sequence)`
    pub fn parse(s: &str) -> Option<(i32, i64)> {
        let rest = s.strip_prefix("PO-")?;
        let (year, sequence) = rest.split_once('-')?;
        if year.len() != 4 || sequence.len() < 4 {
            return None;
        }
        if !sequence.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((year.parse().ok()?, sequence.parse().ok()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered-vs-received state of one order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineProgress {
    pub line_number: i32,
    pub quantity_ordered: Decimal,
    pub quantity_received: Decimal,
}

impl LineProgress {
    pub fn outstanding(&self) -> Decimal {
        self.quantity_ordered - self.quantity_received
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }

    /// Validate a delivery against this line and return the new received total
    pub fn receive(&self, quantity: Decimal) -> Result<Decimal, LedgerError> {
        if quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidQuantity(
                "received quantity must be positive".to_string(),
            ));
        }

        self.quantity_received
            .checked_add(quantity)
            .filter(|received| *received <= self.quantity_ordered)
            .ok_or(LedgerError::OverReceipt {
                line_number: self.line_number,
                ordered: self.quantity_ordered,
                received: self.quantity_received,
                attempted: quantity,
            })
    }
}

/// Status an order should hold after a receipt, given all of its lines
pub fn derive_receipt_status(
    current: PurchaseOrderStatus,
    lines: &[LineProgress],
) -> PurchaseOrderStatus {
    if !lines.is_empty() && lines.iter().all(LineProgress::is_fully_received) {
        PurchaseOrderStatus::Received
    } else if lines.iter().any(|l| l.quantity_received > Decimal::ZERO) {
        PurchaseOrderStatus::PartiallyReceived
    } else {
        current
    }
}

/// Validate ordered quantity and unit price, returning the line total
pub fn line_total(quantity_ordered: Decimal, unit_price: Decimal) -> Result<Decimal, LedgerError> {
    if quantity_ordered <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(
            "quantity_ordered must be positive".to_string(),
        ));
    }
    if unit_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidUnitPrice(
            "unit_price must be positive".to_string(),
        ));
    }
    quantity_ordered
        .checked_mul(unit_price)
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| {
            LedgerError::InvalidQuantity(format!(
                "line total of {} x {} exceeds {}",
                quantity_ordered, unit_price, MAX_AMOUNT
            ))
        })
}

/// Sum of line totals, bounded like a single amount
pub fn order_total<I>(line_totals: I) -> Result<Decimal, LedgerError>
where
    I: IntoIterator<Item = Decimal>,
{
    line_totals
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, total| {
            sum.checked_add(total).filter(|s| *s <= MAX_AMOUNT)
        })
        .ok_or_else(|| LedgerError::InvalidQuantity(format!("order total exceeds {}", MAX_AMOUNT)))
}

/// A purchase order header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub supplier_id: Uuid,
    pub status: PurchaseOrderStatus,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub sent_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub storage_item_id: Uuid,
    pub line_number: i32,
    pub quantity_ordered: Decimal,
    pub quantity_received: Decimal,
    /// Backorder still expected for this line
    pub quantity_outstanding: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub condition_received: Condition,
}

impl PurchaseOrderItem {
    pub fn progress(&self) -> LineProgress {
        LineProgress {
            line_number: self.line_number,
            quantity_ordered: self.quantity_ordered,
            quantity_received: self.quantity_received,
        }
    }
}

/// Order header together with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderWithItems {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}
