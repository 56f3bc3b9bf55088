//! Procurement service: purchase order lifecycle and receipt reconciliation

use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::ProcurementConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    derive_receipt_status, line_total, order_total, Condition, LineProgress, MovementReference,
    MovementType, PurchaseOrder, PurchaseOrderItem, PurchaseOrderItemRow, PurchaseOrderRow,
    PurchaseOrderStatus, PurchaseOrderWithItems, StockMovement, PURCHASE_ORDER_COLUMNS,
    PURCHASE_ORDER_ITEM_COLUMNS,
};
use crate::services::movement::{MovementRequest, MovementService};
use crate::services::OrderNumberAllocator;
use shared::{
    validate_currency_code, validate_quantity, validate_unit, validate_unit_price, Pagination,
};

/// Purchase order service
#[derive(Clone)]
pub struct ProcurementService {
    db: PgPool,
    config: ProcurementConfig,
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Uuid,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub currency: Option<String>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "An order needs at least one line"))]
    pub items: Vec<CreateOrderLineInput>,
}

/// One line of a new purchase order
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateOrderLineInput {
    pub storage_item_id: Uuid,
    pub quantity_ordered: Decimal,
    pub unit_price: Decimal,
    pub unit: Option<String>,
    /// Condition the goods are expected in, `new` if omitted
    pub condition: Option<String>,
}

/// Input for receiving goods against one order line
#[derive(Debug, Deserialize)]
pub struct ReceiveLineInput {
    pub quantity: Decimal,
    /// Overrides the line's expected condition
    pub condition: Option<String>,
}

/// Query parameters for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Result of a line receipt: the reconciled order and the stock movement it posted
#[derive(Debug, Serialize)]
pub struct LineReceipt {
    pub order: PurchaseOrderWithItems,
    pub movement: StockMovement,
}

/// A validated order line
#[derive(Debug)]
struct PreparedLine {
    storage_item_id: Uuid,
    quantity_ordered: Decimal,
    unit_price: Decimal,
    unit: String,
    condition: Condition,
    line_total: Decimal,
}

/// A validated order, ready to insert
#[derive(Debug)]
struct PreparedOrder {
    supplier_id: Uuid,
    order_date: NaiveDate,
    expected_delivery_date: Option<NaiveDate>,
    currency: String,
    notes: Option<String>,
    lines: Vec<PreparedLine>,
    total_amount: Decimal,
}

fn prepare_line(index: usize, line: CreateOrderLineInput) -> AppResult<PreparedLine> {
    let field = |name: &str| format!("items[{}].{}", index, name);

    validate_quantity(line.quantity_ordered)
        .map_err(|msg| AppError::validation(&field("quantity_ordered"), msg))?;
    validate_unit_price(line.unit_price)
        .map_err(|msg| AppError::validation(&field("unit_price"), msg))?;
    let total = line_total(line.quantity_ordered, line.unit_price)?;

    let unit = line.unit.unwrap_or_else(|| "pcs".to_string());
    validate_unit(&unit).map_err(|msg| AppError::validation(&field("unit"), msg))?;

    let condition = match line.condition.as_deref() {
        Some(c) => c.parse::<Condition>()?,
        None => Condition::New,
    };

    Ok(PreparedLine {
        storage_item_id: line.storage_item_id,
        quantity_ordered: line.quantity_ordered,
        unit_price: line.unit_price,
        unit: unit.trim().to_string(),
        condition,
        line_total: total,
    })
}

fn prepare_order(
    config: &ProcurementConfig,
    input: CreatePurchaseOrderInput,
) -> AppResult<PreparedOrder> {
    input.validate()?;

    let currency = input
        .currency
        .unwrap_or_else(|| config.default_currency.clone());
    validate_currency_code(&currency).map_err(|msg| AppError::validation("currency", msg))?;

    let order_date = input.order_date.unwrap_or_else(|| Utc::now().date_naive());
    if let Some(expected) = input.expected_delivery_date {
        if expected < order_date {
            return Err(AppError::validation(
                "expected_delivery_date",
                "Expected delivery cannot be before the order date",
            ));
        }
    }

    let lines = input
        .items
        .into_iter()
        .enumerate()
        .map(|(i, line)| prepare_line(i, line))
        .collect::<AppResult<Vec<_>>>()?;
    let total_amount = order_total(lines.iter().map(|l| l.line_total))?;

    Ok(PreparedOrder {
        supplier_id: input.supplier_id,
        order_date,
        expected_delivery_date: input.expected_delivery_date,
        currency,
        notes: input.notes,
        lines,
        total_amount,
    })
}

impl ProcurementService {
    /// Create a new ProcurementService instance
    pub fn new(db: PgPool, config: ProcurementConfig) -> Self {
        Self { db, config }
    }

    /// Create a draft order with a freshly allocated order number.
    ///
    /// A lost allocation race is retried with exponential backoff.
    #[tracing::instrument(skip(self, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create_order(
        &self,
        actor: Uuid,
        input: CreatePurchaseOrderInput,
    ) -> AppResult<PurchaseOrderWithItems> {
        let prepared = prepare_order(&self.config, input)?;

        let mut attempt = 0;
        let mut backoff = Duration::from_millis(self.config.allocation_backoff_ms);
        loop {
            match self.insert_order(actor, &prepared).await {
                Err(e) if e.is_retryable() && attempt < self.config.allocation_max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "order creation conflict, retrying: {}",
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                result => return result,
            }
        }
    }

    async fn insert_order(
        &self,
        actor: Uuid,
        prepared: &PreparedOrder,
    ) -> AppResult<PurchaseOrderWithItems> {
        let mut tx = self.db.begin().await?;

        let supplier_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)")
                .bind(prepared.supplier_id)
                .fetch_one(&mut *tx)
                .await?;

        if !supplier_exists {
            return Err(AppError::NotFound("Supplier".to_string()));
        }

        let mut item_ids: Vec<Uuid> = prepared.lines.iter().map(|l| l.storage_item_id).collect();
        item_ids.sort();
        item_ids.dedup();
        let live_items = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM storage_items WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&item_ids)
        .fetch_one(&mut *tx)
        .await?;

        if live_items != item_ids.len() as i64 {
            return Err(AppError::NotFound("Storage item".to_string()));
        }

        let order_number = OrderNumberAllocator::allocate(&mut tx, prepared.order_date.year()).await?;

        let sql = format!(
            r#"
            INSERT INTO purchase_orders (
                order_number, supplier_id, status, order_date, expected_delivery_date,
                total_amount, currency, notes, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            PURCHASE_ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(order_number.as_str())
            .bind(prepared.supplier_id)
            .bind(PurchaseOrderStatus::Draft.as_str())
            .bind(prepared.order_date)
            .bind(prepared.expected_delivery_date)
            .bind(prepared.total_amount)
            .bind(&prepared.currency)
            .bind(&prepared.notes)
            .bind(actor)
            .fetch_one(&mut *tx)
            .await?
            .into_domain()?;

        let sql = format!(
            r#"
            INSERT INTO purchase_order_items (
                purchase_order_id, storage_item_id, line_number, quantity_ordered,
                unit, unit_price, line_total, condition_received
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            PURCHASE_ORDER_ITEM_COLUMNS
        );
        let mut items = Vec::with_capacity(prepared.lines.len());
        for (line_number, line) in (1..).zip(&prepared.lines) {
            let item = sqlx::query_as::<_, PurchaseOrderItemRow>(&sql)
                .bind(order.id)
                .bind(line.storage_item_id)
                .bind(line_number)
                .bind(line.quantity_ordered)
                .bind(&line.unit)
                .bind(line.unit_price)
                .bind(line.line_total)
                .bind(line.condition.as_str())
                .fetch_one(&mut *tx)
                .await?
                .into_domain()?;
            items.push(item);
        }

        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            lines = items.len(),
            total_amount = %order.total_amount,
            "purchase order created"
        );

        Ok(PurchaseOrderWithItems { order, items })
    }

    /// Mark a draft order as sent to the supplier
    #[tracing::instrument(skip(self))]
    pub async fn send(&self, actor: Uuid, order_id: Uuid) -> AppResult<PurchaseOrderWithItems> {
        self.transition(actor, order_id, PurchaseOrderStatus::Sent).await
    }

    /// Record the supplier's confirmation
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, actor: Uuid, order_id: Uuid) -> AppResult<PurchaseOrderWithItems> {
        self.transition(actor, order_id, PurchaseOrderStatus::Confirmed).await
    }

    /// Stop expecting further deliveries. Stock already received stays.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, actor: Uuid, order_id: Uuid) -> AppResult<PurchaseOrderWithItems> {
        self.transition(actor, order_id, PurchaseOrderStatus::Cancelled).await
    }

    async fn transition(
        &self,
        actor: Uuid,
        order_id: Uuid,
        next: PurchaseOrderStatus,
    ) -> AppResult<PurchaseOrderWithItems> {
        let mut tx = self.db.begin().await?;

        let current = Self::lock_order(&mut tx, order_id).await?;
        let status = current.status.transition_to(next).map_err(|e| {
            tracing::warn!(order_number = %current.order_number, "{}", e);
            AppError::from(e)
        })?;
        let sent_date = (status == PurchaseOrderStatus::Sent).then(|| Utc::now().date_naive());

        let order = Self::update_status(&mut tx, actor, order_id, status, sent_date, None).await?;
        let items = Self::load_items(&mut tx, order_id).await?;

        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            from = %current.status,
            to = %order.status,
            "purchase order status changed"
        );

        Ok(PurchaseOrderWithItems { order, items })
    }

    /// Receive goods against one line, post the stock receipt and reconcile
    /// the order status, all in one transaction
    #[tracing::instrument(skip(self, input))]
    pub async fn receive_line(
        &self,
        actor: Uuid,
        order_id: Uuid,
        line_id: Uuid,
        input: ReceiveLineInput,
    ) -> AppResult<LineReceipt> {
        let condition_override = input
            .condition
            .as_deref()
            .map(str::parse::<Condition>)
            .transpose()?;
        validate_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        let mut tx = self.db.begin().await?;

        let order = Self::lock_order(&mut tx, order_id).await?;
        if !order.status.accepts_receipts() {
            tracing::warn!(
                order_number = %order.order_number,
                status = %order.status,
                "receipt on closed order rejected"
            );
            return Err(shared::LedgerError::OrderNotReceivable(order.status).into());
        }

        let sql = format!(
            "SELECT {} FROM purchase_order_items WHERE id = $1 AND purchase_order_id = $2 FOR UPDATE",
            PURCHASE_ORDER_ITEM_COLUMNS
        );
        let line = sqlx::query_as::<_, PurchaseOrderItemRow>(&sql)
            .bind(line_id)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order line".to_string()))?
            .into_domain()?;

        let new_received = line.progress().receive(input.quantity).map_err(|e| {
            tracing::warn!(order_number = %order.order_number, line_number = line.line_number, "{}", e);
            AppError::from(e)
        })?;
        let condition = condition_override.unwrap_or(line.condition_received);

        let mut legs = MovementService::post(
            &mut tx,
            actor,
            MovementRequest {
                storage_item_id: line.storage_item_id,
                movement_type: MovementType::Receipt,
                condition,
                quantity: input.quantity,
                transfer: None,
                reference: Some(MovementReference::purchase_order_item(line.id)),
                reason: Some(format!("{} line {}", order.order_number, line.line_number)),
            },
        )
        .await?;
        let movement = legs
            .pop()
            .ok_or_else(|| AppError::Internal("receipt produced no movement".to_string()))?;

        sqlx::query(
            r#"
            UPDATE purchase_order_items
            SET quantity_received = $1, condition_received = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(new_received)
        .bind(condition.as_str())
        .bind(line.id)
        .execute(&mut *tx)
        .await?;

        let items = Self::load_items(&mut tx, order_id).await?;
        let progress: Vec<LineProgress> = items.iter().map(PurchaseOrderItem::progress).collect();
        let status = derive_receipt_status(order.status, &progress);

        let updated = if status != order.status {
            order.status.transition_to(status)?;
            let delivered = (status == PurchaseOrderStatus::Received).then(|| Utc::now().date_naive());
            Self::update_status(&mut tx, actor, order_id, status, None, delivered).await?
        } else {
            Self::touch(&mut tx, actor, order_id).await?
        };

        tx.commit().await?;

        tracing::info!(
            order_number = %updated.order_number,
            line_number = line.line_number,
            quantity = %input.quantity,
            status = %updated.status,
            "purchase order line received"
        );

        Ok(LineReceipt {
            order: PurchaseOrderWithItems {
                order: updated,
                items,
            },
            movement,
        })
    }

    /// Order header with its lines
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> AppResult<PurchaseOrderWithItems> {
        let mut conn = self.db.acquire().await?;

        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE id = $1",
            PURCHASE_ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?
            .into_domain()?;
        let items = Self::load_items(&mut conn, order_id).await?;

        Ok(PurchaseOrderWithItems { order, items })
    }

    /// List order headers, newest first
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, filter: OrderFilter) -> AppResult<Vec<PurchaseOrder>> {
        let status = filter
            .status
            .as_deref()
            .map(str::parse::<PurchaseOrderStatus>)
            .transpose()?;
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let sql = format!(
            r#"
            SELECT {}
            FROM purchase_orders
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
            ORDER BY order_date DESC, order_number DESC
            LIMIT $3 OFFSET $4
            "#,
            PURCHASE_ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(filter.supplier_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(PurchaseOrderRow::into_domain).collect()
    }

    async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<PurchaseOrder> {
        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
            PURCHASE_ORDER_COLUMNS
        );
        sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?
            .into_domain()
    }

    async fn load_items(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<PurchaseOrderItem>> {
        let sql = format!(
            "SELECT {} FROM purchase_order_items WHERE purchase_order_id = $1 ORDER BY line_number",
            PURCHASE_ORDER_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, PurchaseOrderItemRow>(&sql)
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(PurchaseOrderItemRow::into_domain).collect()
    }

    async fn update_status(
        conn: &mut PgConnection,
        actor: Uuid,
        order_id: Uuid,
        status: PurchaseOrderStatus,
        sent_date: Option<NaiveDate>,
        actual_delivery_date: Option<NaiveDate>,
    ) -> AppResult<PurchaseOrder> {
        let sql = format!(
            r#"
            UPDATE purchase_orders
            SET status = $1,
                sent_date = COALESCE($2, sent_date),
                actual_delivery_date = COALESCE($3, actual_delivery_date),
                updated_at = NOW(), updated_by = $4
            WHERE id = $5
            RETURNING {}
            "#,
            PURCHASE_ORDER_COLUMNS
        );
        sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(status.as_str())
            .bind(sent_date)
            .bind(actual_delivery_date)
            .bind(actor)
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?
            .into_domain()
    }

    async fn touch(conn: &mut PgConnection, actor: Uuid, order_id: Uuid) -> AppResult<PurchaseOrder> {
        let sql = format!(
            "UPDATE purchase_orders SET updated_at = NOW(), updated_by = $1 WHERE id = $2 RETURNING {}",
            PURCHASE_ORDER_COLUMNS
        );
        sqlx::query_as::<_, PurchaseOrderRow>(&sql)
            .bind(actor)
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?
            .into_domain()
    }
}
