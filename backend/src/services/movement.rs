//! Movement recorder: the only writer of storage quantities
//!
//! Every quantity change locks the affected storage rows, applies the delta
//! and appends a movement row in the same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    Condition, DeltaOutcome, LegSide, MovementReference, MovementRow, MovementType, StockMovement,
    StorageItem, TransferEndpoints, MOVEMENT_COLUMNS, PURCHASE_ORDER_ITEM_REFERENCE,
};
use crate::services::LedgerService;
use shared::{validate_quantity, Pagination};

/// Movement recording service
#[derive(Clone)]
pub struct MovementService {
    db: PgPool,
}

/// Input for recording a stock movement
#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementInput {
    pub storage_item_id: Uuid,
    pub movement_type: String,
    pub condition: String,
    /// Positive magnitude, or a signed delta for adjustments
    pub quantity: Decimal,
    pub from_compartment_id: Option<Uuid>,
    pub to_compartment_id: Option<Uuid>,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Reference type must be 1-50 characters"))]
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

/// Query parameters for a storage row's movement history
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub movement_type: Option<String>,
    pub condition: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A validated movement ready to post
#[derive(Debug, Clone)]
pub(crate) struct MovementRequest {
    pub storage_item_id: Uuid,
    pub movement_type: MovementType,
    pub condition: Condition,
    pub quantity: Decimal,
    pub transfer: Option<TransferEndpoints>,
    pub reference: Option<MovementReference>,
    pub reason: Option<String>,
}

impl TryFrom<RecordMovementInput> for MovementRequest {
    type Error = AppError;

    fn try_from(input: RecordMovementInput) -> Result<Self, Self::Error> {
        input.validate()?;

        let movement_type = input.movement_type.parse::<MovementType>()?;
        let condition = input.condition.parse::<Condition>()?;
        validate_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        let transfer = if movement_type == MovementType::Transfer {
            Some(TransferEndpoints::from_options(
                input.from_compartment_id,
                input.to_compartment_id,
            )?)
        } else if input.from_compartment_id.is_some() || input.to_compartment_id.is_some() {
            return Err(AppError::validation(
                "to_compartment_id",
                "Compartments can only be given for transfers",
            ));
        } else {
            None
        };

        let reference = match (input.reference_type, input.reference_id) {
            (Some(reference_type), Some(_)) if reference_type == PURCHASE_ORDER_ITEM_REFERENCE => {
                return Err(AppError::validation(
                    "reference_type",
                    "purchase_order_item references are written by order receiving only",
                ))
            }
            (Some(reference_type), Some(reference_id)) => Some(MovementReference {
                reference_type,
                reference_id,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::validation(
                    "reference_id",
                    "reference_type and reference_id must be given together",
                ))
            }
        };

        Ok(Self {
            storage_item_id: input.storage_item_id,
            movement_type,
            condition,
            quantity: input.quantity,
            transfer,
            reference,
            reason: input.reason,
        })
    }
}

impl MovementService {
    /// Create a new MovementService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a movement in its own transaction.
    ///
    /// Returns the movement written against the requested row. A transfer also
    /// writes the destination leg, visible in that row's history.
    #[tracing::instrument(skip(self, input), fields(storage_item_id = %input.storage_item_id))]
    pub async fn record(&self, actor: Uuid, input: RecordMovementInput) -> AppResult<StockMovement> {
        let request = MovementRequest::try_from(input)?;

        let mut tx = self.db.begin().await?;
        let mut legs = Self::post(&mut tx, actor, request).await?;
        tx.commit().await?;

        for leg in &legs {
            tracing::info!(
                storage_item_id = %leg.storage_item_id,
                movement_type = %leg.movement_type,
                condition = %leg.condition,
                quantity = %leg.quantity,
                quantity_after = %leg.quantity_after,
                "stock movement recorded"
            );
        }

        if legs.is_empty() {
            return Err(AppError::Internal("movement produced no rows".to_string()));
        }
        Ok(legs.swap_remove(0))
    }

    /// Apply a movement on the caller's transaction and return every row written,
    /// source leg first
    pub(crate) async fn post(
        conn: &mut PgConnection,
        actor: Uuid,
        request: MovementRequest,
    ) -> AppResult<Vec<StockMovement>> {
        let legs = request.movement_type.plan(request.quantity)?;

        let mut rows = match request.transfer {
            None => {
                let item = LedgerService::lock(conn, request.storage_item_id).await?;
                vec![item]
            }
            Some(endpoints) => {
                let source = LedgerService::find(conn, request.storage_item_id).await?;
                if source.compartment_id != endpoints.from_compartment_id {
                    return Err(AppError::validation(
                        "from_compartment_id",
                        "Storage item is not held in the source compartment",
                    ));
                }
                let destination_id = LedgerService::ensure_in_compartment(
                    conn,
                    actor,
                    &source,
                    endpoints.to_compartment_id,
                )
                .await?;

                LedgerService::lock_many(conn, &[source.id, destination_id]).await?
            }
        };

        let mut written = Vec::with_capacity(legs.len());
        for leg in legs {
            let item = match leg.side {
                LegSide::Source => rows.iter_mut().find(|r| r.id == request.storage_item_id),
                LegSide::Destination => rows.iter_mut().find(|r| r.id != request.storage_item_id),
            }
            .ok_or_else(|| AppError::Internal("transfer leg without a locked row".to_string()))?;

            let outcome =
                LedgerService::apply_delta(conn, actor, item, request.condition, leg.delta).await?;
            let movement = Self::insert(conn, actor, &request, item, outcome).await?;
            written.push(movement);
        }

        Ok(written)
    }

    async fn insert(
        conn: &mut PgConnection,
        actor: Uuid,
        request: &MovementRequest,
        item: &StorageItem,
        outcome: DeltaOutcome,
    ) -> AppResult<StockMovement> {
        let sql = format!(
            r#"
            INSERT INTO stock_movements (
                storage_item_id, movement_type, condition, quantity,
                quantity_before, quantity_after, from_compartment_id, to_compartment_id,
                reference_type, reference_id, reason, performed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(item.id)
            .bind(request.movement_type.as_str())
            .bind(outcome.condition.as_str())
            .bind(outcome.delta)
            .bind(outcome.before)
            .bind(outcome.after)
            .bind(request.transfer.map(|t| t.from_compartment_id))
            .bind(request.transfer.map(|t| t.to_compartment_id))
            .bind(request.reference.as_ref().map(|r| r.reference_type.as_str()))
            .bind(request.reference.as_ref().map(|r| r.reference_id))
            .bind(&request.reason)
            .bind(actor)
            .fetch_one(&mut *conn)
            .await?;

        row.into_domain()
    }

    /// Movement history of one storage row, newest first
    #[tracing::instrument(skip(self))]
    pub async fn list_movements(
        &self,
        storage_item_id: Uuid,
        filter: MovementFilter,
    ) -> AppResult<Vec<StockMovement>> {
        let movement_type = filter
            .movement_type
            .as_deref()
            .map(str::parse::<MovementType>)
            .transpose()?;
        let condition = filter
            .condition
            .as_deref()
            .map(str::parse::<Condition>)
            .transpose()?;
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        // Deactivated rows keep their history
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM storage_items WHERE id = $1)",
        )
        .bind(storage_item_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Storage item".to_string()));
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE storage_item_id = $1
              AND ($2::varchar IS NULL OR movement_type = $2)
              AND ($3::varchar IS NULL OR condition = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
              AND ($6::varchar IS NULL OR reference_type = $6)
              AND ($7::uuid IS NULL OR reference_id = $7)
            ORDER BY created_at DESC, id DESC
            LIMIT $8 OFFSET $9
            "#,
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(storage_item_id)
            .bind(movement_type.map(|t| t.as_str()))
            .bind(condition.map(|c| c.as_str()))
            .bind(filter.from)
            .bind(filter.to)
            .bind(&filter.reference_type)
            .bind(filter.reference_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(MovementRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures;
    use shared::LedgerError;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn input(storage_item_id: Uuid, movement_type: &str, condition: &str, quantity: &str) -> RecordMovementInput {
        RecordMovementInput {
            storage_item_id,
            movement_type: movement_type.to_string(),
            condition: condition.to_string(),
            quantity: dec(quantity),
            from_compartment_id: None,
            to_compartment_id: None,
            reason: None,
            reference_type: None,
            reference_id: None,
        }
    }

    #[test]
    fn test_unknown_movement_type_rejected_before_io() {
        let err = MovementRequest::try_from(input(Uuid::new_v4(), "loan", "new", "1")).unwrap_err();
        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::InvalidMovementType(ref t)) if t == "loan"
        ));

        let err = MovementRequest::try_from(input(Uuid::new_v4(), "issue", "worn", "1")).unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::InvalidCondition(_))));
    }

    #[test]
    fn test_transfer_without_endpoint_rejected() {
        let mut transfer = input(Uuid::new_v4(), "transfer", "used", "2");
        transfer.from_compartment_id = Some(Uuid::new_v4());

        let err = MovementRequest::try_from(transfer).unwrap_err();
        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::MissingTransferEndpoint("to_compartment_id"))
        ));
    }

    #[test]
    fn test_half_reference_rejected() {
        let mut receipt = input(Uuid::new_v4(), "receipt", "new", "2");
        receipt.reference_type = Some("delivery_note".to_string());

        assert!(matches!(
            MovementRequest::try_from(receipt),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_order_line_reference_reserved_for_receiving() {
        let mut receipt = input(Uuid::new_v4(), "receipt", "new", "2");
        receipt.reference_type = Some(PURCHASE_ORDER_ITEM_REFERENCE.to_string());
        receipt.reference_id = Some(Uuid::new_v4());

        assert!(matches!(
            MovementRequest::try_from(receipt),
            Err(AppError::Validation { ref field, .. }) if field == "reference_type"
        ));

        let mut delivery_note = input(Uuid::new_v4(), "receipt", "new", "2");
        delivery_note.reference_type = Some("delivery_note".to_string());
        delivery_note.reference_id = Some(Uuid::new_v4());
        assert!(MovementRequest::try_from(delivery_note).is_ok());
    }

    #[test]
    fn test_oversized_quantity_rejected() {
        for quantity in ["79228162514264337593543950335", "10000000000", "-10000000000"] {
            assert!(matches!(
                MovementRequest::try_from(input(Uuid::new_v4(), "adjustment", "new", quantity)),
                Err(AppError::Validation { ref field, .. }) if field == "quantity"
            ));
        }
    }

    #[test]
    fn test_excess_precision_rejected() {
        assert!(matches!(
            MovementRequest::try_from(input(Uuid::new_v4(), "receipt", "new", "1.0005")),
            Err(AppError::Validation { .. })
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_issue_beyond_stock_leaves_row_unchanged(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("10", "5", "3")).await;
        let ledger = LedgerService::new(pool.clone());
        let service = MovementService::new(pool);

        let err = service
            .record(fixtures::ACTOR, input(row, "issue", "new", "15"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::InsufficientStock { available, requested, .. })
                if available == dec("10") && requested == dec("15")
        ));
        assert_eq!(ledger.get_stock(row).await.unwrap().quantity_new, dec("10"));
        assert!(service
            .list_movements(row, MovementFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_each_movement_snapshots_before_and_after(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("10", "0", "0")).await;
        let service = MovementService::new(pool);

        service.record(fixtures::ACTOR, input(row, "issue", "new", "4")).await.unwrap();
        service.record(fixtures::ACTOR, input(row, "receipt", "reground", "2.5")).await.unwrap();
        let adjusted = service
            .record(fixtures::ACTOR, input(row, "adjustment", "new", "-1"))
            .await
            .unwrap();

        assert_eq!(adjusted.quantity, dec("-1"));
        assert_eq!(adjusted.quantity_before, dec("6"));
        assert_eq!(adjusted.quantity_after, dec("5"));

        let history = service.list_movements(row, MovementFilter::default()).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(StockMovement::is_balanced));
        assert_eq!(history[0].movement_type, MovementType::Adjustment);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_transfer_writes_one_row_per_leg(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("0", "6", "0")).await;
        let target = fixtures::compartment(&pool).await;
        let ledger = LedgerService::new(pool.clone());
        let service = MovementService::new(pool);
        let source_compartment = ledger.get_stock(row).await.unwrap().compartment_id;

        let mut transfer = input(row, "transfer", "used", "4");
        transfer.from_compartment_id = Some(source_compartment);
        transfer.to_compartment_id = Some(target);
        let source_leg = service.record(fixtures::ACTOR, transfer).await.unwrap();

        assert_eq!(source_leg.storage_item_id, row);
        assert_eq!(source_leg.quantity, dec("-4"));
        assert_eq!(source_leg.quantity_after, dec("2"));

        let destination = ledger
            .list_stock(crate::services::ledger::StockFilter {
                compartment_id: Some(target),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(destination.len(), 1);
        assert_eq!(destination[0].quantity_used, dec("4"));
        assert_eq!(destination[0].weight_used, dec("0.5"));

        let legs = service
            .list_movements(destination[0].storage_item_id, MovementFilter::default())
            .await
            .unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].quantity, dec("4"));
        assert_eq!(legs[0].from_compartment_id, Some(source_compartment));
        assert_eq!(legs[0].to_compartment_id, Some(target));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_failed_transfer_leaves_no_destination_row(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("1", "0", "0")).await;
        let target = fixtures::compartment(&pool).await;
        let ledger = LedgerService::new(pool.clone());
        let service = MovementService::new(pool);
        let source_compartment = ledger.get_stock(row).await.unwrap().compartment_id;

        let mut transfer = input(row, "transfer", "new", "3");
        transfer.from_compartment_id = Some(source_compartment);
        transfer.to_compartment_id = Some(target);
        assert!(service.record(fixtures::ACTOR, transfer).await.is_err());

        let destination = ledger
            .list_stock(crate::services::ledger::StockFilter {
                compartment_id: Some(target),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(destination.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_issues_never_overdraw(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("5", "0", "0")).await;
        let service = MovementService::new(pool.clone());

        let mut handles = Vec::new();
        for _ in 0..12 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.record(fixtures::ACTOR, input(row, "issue", "new", "1")).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        let view = LedgerService::new(pool).get_stock(row).await.unwrap();
        assert_eq!(view.quantity_new, Decimal::ZERO);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_measuring_equipment_holds_one_unit(pool: PgPool) {
        let gauge = fixtures::empty_gauge(&pool).await;
        let service = MovementService::new(pool);

        service.record(fixtures::ACTOR, input(gauge, "receipt", "new", "1")).await.unwrap();

        let err = service
            .record(fixtures::ACTOR, input(gauge, "receipt", "new", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::SingletonViolation(_))));

        let err = service
            .record(fixtures::ACTOR, input(gauge, "receipt", "used", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::SingletonViolation(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_movement_log_is_append_only(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("3", "0", "0")).await;
        let service = MovementService::new(pool.clone());
        let movement = service
            .record(fixtures::ACTOR, input(row, "scrap", "new", "1"))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE stock_movements SET quantity = -2 WHERE id = $1")
            .bind(movement.id)
            .execute(&pool)
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM stock_movements WHERE id = $1")
            .bind(movement.id)
            .execute(&pool)
            .await;
        assert!(delete.is_err());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_history_filters(pool: PgPool) {
        let row = fixtures::stocked_tool(&pool, ("10", "0", "0")).await;
        let service = MovementService::new(pool);

        service.record(fixtures::ACTOR, input(row, "issue", "new", "1")).await.unwrap();
        service.record(fixtures::ACTOR, input(row, "scrap", "new", "1")).await.unwrap();
        service.record(fixtures::ACTOR, input(row, "issue", "new", "1")).await.unwrap();

        let issues = service
            .list_movements(
                row,
                MovementFilter {
                    movement_type: Some("issue".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);

        let page = service
            .list_movements(
                row,
                MovementFilter {
                    page: Some(2),
                    per_page: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].movement_type, MovementType::Issue);

        assert!(matches!(
            service
                .list_movements(
                    row,
                    MovementFilter {
                        condition: Some("broken".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(AppError::Ledger(LedgerError::InvalidCondition(_)))
        ));
    }
}
