//! Database row types for the Shop Floor Inventory service
//!
//! Rows are read with runtime-checked queries and converted into the shared
//! domain models. Enum columns are stored as text and parsed here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

pub use shared::models::*;

use crate::error::{AppError, AppResult};

/// Column list shared by every `storage_items` read
pub const STORAGE_ITEM_COLUMNS: &str = "id, item_kind, item_id, compartment_id, \
     quantity_new, quantity_used, quantity_reground, \
     weight_new, weight_used, weight_reground, \
     min_quantity, reorder_point, max_quantity, enable_low_stock_alert, \
     is_active, updated_at";

pub const MOVEMENT_COLUMNS: &str = "id, storage_item_id, movement_type, condition, quantity, \
     quantity_before, quantity_after, from_compartment_id, to_compartment_id, \
     reference_type, reference_id, reason, performed_by, created_at";

pub const PURCHASE_ORDER_COLUMNS: &str = "id, order_number, supplier_id, status, order_date, \
     expected_delivery_date, actual_delivery_date, sent_date, total_amount, currency, notes, \
     created_at, updated_at";

pub const PURCHASE_ORDER_ITEM_COLUMNS: &str = "id, purchase_order_id, storage_item_id, \
     line_number, quantity_ordered, quantity_received, unit, unit_price, line_total, \
     condition_received";

/// Stored values that fail to parse mean the table was written outside this service
fn corrupt(table: &str, id: Uuid, err: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("{} row {} is inconsistent: {}", table, id, err))
}

#[derive(Debug, FromRow)]
pub struct StorageItemRow {
    pub id: Uuid,
    pub item_kind: String,
    pub item_id: Uuid,
    pub compartment_id: Uuid,
    pub quantity_new: Decimal,
    pub quantity_used: Decimal,
    pub quantity_reground: Decimal,
    pub weight_new: Decimal,
    pub weight_used: Decimal,
    pub weight_reground: Decimal,
    pub min_quantity: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_quantity: Option<Decimal>,
    pub enable_low_stock_alert: bool,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl StorageItemRow {
    pub fn into_domain(self) -> AppResult<StorageItem> {
        let item = ItemRef::from_parts(&self.item_kind, self.item_id)
            .map_err(|e| corrupt("storage_items", self.id, e))?;

        Ok(StorageItem {
            id: self.id,
            item,
            compartment_id: self.compartment_id,
            quantities: ConditionQuantities::new(
                self.quantity_new,
                self.quantity_used,
                self.quantity_reground,
            ),
            weights: ConditionWeights::new(self.weight_new, self.weight_used, self.weight_reground),
            thresholds: StockThresholds {
                min_quantity: self.min_quantity,
                reorder_point: self.reorder_point,
                max_quantity: self.max_quantity,
                enable_low_stock_alert: self.enable_low_stock_alert,
            },
            is_active: self.is_active,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MovementRow {
    pub id: Uuid,
    pub storage_item_id: Uuid,
    pub movement_type: String,
    pub condition: String,
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

impl MovementRow {
    pub fn into_domain(self) -> AppResult<StockMovement> {
        let movement_type = self
            .movement_type
            .parse::<MovementType>()
            .map_err(|e| corrupt("stock_movements", self.id, e))?;
        let condition = self
            .condition
            .parse::<Condition>()
            .map_err(|e| corrupt("stock_movements", self.id, e))?;

        Ok(StockMovement {
            id: self.id,
            storage_item_id: self.storage_item_id,
            movement_type,
            condition,
            quantity: self.quantity,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            from_compartment_id: self.from_compartment_id,
            to_compartment_id: self.to_compartment_id,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            reason: self.reason,
            performed_by: self.performed_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PurchaseOrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub supplier_id: Uuid,
    pub status: String,
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

impl PurchaseOrderRow {
    pub fn into_domain(self) -> AppResult<PurchaseOrder> {
        let status = self
            .status
            .parse::<PurchaseOrderStatus>()
            .map_err(|e| corrupt("purchase_orders", self.id, e))?;
        let (year, sequence) = OrderNumber::parse(&self.order_number).ok_or_else(|| {
            corrupt(
                "purchase_orders",
                self.id,
                format!("malformed order number {}", self.order_number),
            )
        })?;

        Ok(PurchaseOrder {
            id: self.id,
            order_number: OrderNumber::format(year, sequence),
            supplier_id: self.supplier_id,
            status,
            order_date: self.order_date,
            expected_delivery_date: self.expected_delivery_date,
            actual_delivery_date: self.actual_delivery_date,
            sent_date: self.sent_date,
            total_amount: self.total_amount,
            currency: self.currency,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PurchaseOrderItemRow {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub storage_item_id: Uuid,
    pub line_number: i32,
    pub quantity_ordered: Decimal,
    pub quantity_received: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub condition_received: String,
}

impl PurchaseOrderItemRow {
    pub fn into_domain(self) -> AppResult<PurchaseOrderItem> {
        let condition_received = self
            .condition_received
            .parse::<Condition>()
            .map_err(|e| corrupt("purchase_order_items", self.id, e))?;

        Ok(PurchaseOrderItem {
            id: self.id,
            purchase_order_id: self.purchase_order_id,
            storage_item_id: self.storage_item_id,
            line_number: self.line_number,
            quantity_ordered: self.quantity_ordered,
            quantity_received: self.quantity_received,
            quantity_outstanding: self.quantity_ordered - self.quantity_received,
            unit: self.unit,
            unit_price: self.unit_price,
            line_total: self.line_total,
            condition_received,
        })
    }
}
