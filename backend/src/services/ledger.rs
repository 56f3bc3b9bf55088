//! Storage ledger service: per-compartment stock rows and their read model

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Condition, ConditionWeights, DeltaOutcome, ItemRef, StockThresholds, StockView, StorageItem,
    StorageItemRow, STORAGE_ITEM_COLUMNS,
};
use shared::Pagination;

/// Storage ledger service
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for creating a storage row. Stock starts at zero and only enters
/// through movements.
#[derive(Debug, Deserialize)]
pub struct CreateStorageItemInput {
    pub item: ItemRef,
    pub compartment_id: Uuid,
    pub weight_new: Option<Decimal>,
    pub weight_used: Option<Decimal>,
    pub weight_reground: Option<Decimal>,
    pub min_quantity: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_quantity: Option<Decimal>,
    pub enable_low_stock_alert: Option<bool>,
}

impl CreateStorageItemInput {
    fn weights(&self) -> ConditionWeights {
        let standard = ConditionWeights::standard();
        ConditionWeights::new(
            self.weight_new.unwrap_or(standard.new),
            self.weight_used.unwrap_or(standard.used),
            self.weight_reground.unwrap_or(standard.reground),
        )
    }

    fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            min_quantity: self.min_quantity,
            reorder_point: self.reorder_point,
            max_quantity: self.max_quantity,
            enable_low_stock_alert: self.enable_low_stock_alert.unwrap_or(true),
        }
    }
}

/// Replacement settings for a storage row. Quantities are not part of it.
#[derive(Debug, Deserialize)]
pub struct UpdateStorageSettingsInput {
    pub weight_new: Decimal,
    pub weight_used: Decimal,
    pub weight_reground: Decimal,
    pub min_quantity: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_quantity: Option<Decimal>,
    pub enable_low_stock_alert: bool,
}

/// Query parameters for listing stock
#[derive(Debug, Default, Deserialize)]
pub struct StockFilter {
    pub compartment_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn item_table(item: &ItemRef) -> &'static str {
    match item {
        ItemRef::Tool(_) => "tools",
        ItemRef::MeasuringEquipment(_) => "measuring_equipment",
    }
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Current stock of one storage row with every derived figure recomputed
    #[tracing::instrument(skip(self))]
    pub async fn get_stock(&self, storage_item_id: Uuid) -> AppResult<StockView> {
        let mut conn = self.db.acquire().await?;
        let item = Self::find(&mut conn, storage_item_id).await?;
        Ok(item.view())
    }

    /// List stock rows, optionally for one compartment
    #[tracing::instrument(skip(self))]
    pub async fn list_stock(&self, filter: StockFilter) -> AppResult<Vec<StockView>> {
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let sql = format!(
            r#"
            SELECT {}
            FROM storage_items
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR compartment_id = $1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
            STORAGE_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(filter.compartment_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map(|item| item.view()))
            .collect()
    }

    /// Rows whose effective stock is at or below their reorder point
    #[tracing::instrument(skip(self))]
    pub async fn list_low_stock(&self) -> AppResult<Vec<StockView>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM storage_items
            WHERE deleted_at IS NULL
              AND enable_low_stock_alert
              AND reorder_point IS NOT NULL
            ORDER BY compartment_id, id
            "#,
            STORAGE_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, StorageItemRow>(&sql)
            .fetch_all(&self.db)
            .await?;

        let mut low = Vec::new();
        for row in rows {
            let view = row.into_domain()?.view();
            if view.is_low_stock {
                low.push(view);
            }
        }

        tracing::debug!(count = low.len(), "low stock rows");
        Ok(low)
    }

    /// Register an item in a compartment with zero stock
    #[tracing::instrument(skip(self, input))]
    pub async fn create_storage_item(
        &self,
        actor: Uuid,
        input: CreateStorageItemInput,
    ) -> AppResult<StockView> {
        let weights = input.weights();
        weights.validate()?;
        let thresholds = input.thresholds();
        thresholds.validate()?;

        let mut tx = self.db.begin().await?;

        let item_exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            item_table(&input.item)
        ))
        .bind(input.item.id())
        .fetch_one(&mut *tx)
        .await?;

        if !item_exists {
            return Err(AppError::NotFound(match input.item {
                ItemRef::Tool(_) => "Tool".to_string(),
                ItemRef::MeasuringEquipment(_) => "Measuring equipment".to_string(),
            }));
        }

        if !Self::compartment_exists(&mut tx, input.compartment_id).await? {
            return Err(AppError::NotFound("Storage compartment".to_string()));
        }

        let sql = format!(
            r#"
            INSERT INTO storage_items (
                item_kind, item_id, compartment_id,
                weight_new, weight_used, weight_reground,
                min_quantity, reorder_point, max_quantity, enable_low_stock_alert,
                created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {}
            "#,
            STORAGE_ITEM_COLUMNS
        );
        let row = sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(input.item.kind())
            .bind(input.item.id())
            .bind(input.compartment_id)
            .bind(weights.new)
            .bind(weights.used)
            .bind(weights.reground)
            .bind(thresholds.min_quantity)
            .bind(thresholds.reorder_point)
            .bind(thresholds.max_quantity)
            .bind(thresholds.enable_low_stock_alert)
            .bind(actor)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let item = row.into_domain()?;
        tracing::info!(
            storage_item_id = %item.id,
            item_kind = item.item.kind(),
            compartment_id = %item.compartment_id,
            "storage item created"
        );

        Ok(item.view())
    }

    /// Replace weights and thresholds of a storage row
    #[tracing::instrument(skip(self, input))]
    pub async fn update_settings(
        &self,
        actor: Uuid,
        storage_item_id: Uuid,
        input: UpdateStorageSettingsInput,
    ) -> AppResult<StockView> {
        let weights =
            ConditionWeights::new(input.weight_new, input.weight_used, input.weight_reground);
        weights.validate()?;
        let thresholds = StockThresholds {
            min_quantity: input.min_quantity,
            reorder_point: input.reorder_point,
            max_quantity: input.max_quantity,
            enable_low_stock_alert: input.enable_low_stock_alert,
        };
        thresholds.validate()?;

        let sql = format!(
            r#"
            UPDATE storage_items
            SET weight_new = $1, weight_used = $2, weight_reground = $3,
                min_quantity = $4, reorder_point = $5, max_quantity = $6,
                enable_low_stock_alert = $7,
                updated_at = NOW(), updated_by = $8
            WHERE id = $9 AND deleted_at IS NULL
            RETURNING {}
            "#,
            STORAGE_ITEM_COLUMNS
        );
        let row = sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(weights.new)
            .bind(weights.used)
            .bind(weights.reground)
            .bind(thresholds.min_quantity)
            .bind(thresholds.reorder_point)
            .bind(thresholds.max_quantity)
            .bind(thresholds.enable_low_stock_alert)
            .bind(actor)
            .bind(storage_item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Storage item".to_string()))?;

        tracing::info!(storage_item_id = %storage_item_id, "storage settings updated");
        Ok(row.into_domain()?.view())
    }

    /// Soft delete a storage row. Its movement history stays.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, actor: Uuid, storage_item_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE storage_items
            SET is_active = FALSE, deleted_at = NOW(), updated_at = NOW(), updated_by = $1
            WHERE id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(actor)
        .bind(storage_item_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Storage item".to_string()));
        }

        tracing::info!(storage_item_id = %storage_item_id, "storage item deactivated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Row access for the movement recorder. Every write below must run on
    // a transaction that already holds the row lock.
    // ------------------------------------------------------------------

    /// Read a live row without locking it
    pub(crate) async fn find(conn: &mut PgConnection, storage_item_id: Uuid) -> AppResult<StorageItem> {
        let sql = format!(
            "SELECT {} FROM storage_items WHERE id = $1 AND deleted_at IS NULL",
            STORAGE_ITEM_COLUMNS
        );
        sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(storage_item_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Storage item".to_string()))?
            .into_domain()
    }

    /// Lock one live row for the rest of the transaction
    pub(crate) async fn lock(conn: &mut PgConnection, storage_item_id: Uuid) -> AppResult<StorageItem> {
        let sql = format!(
            "SELECT {} FROM storage_items WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            STORAGE_ITEM_COLUMNS
        );
        sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(storage_item_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Storage item".to_string()))?
            .into_domain()
    }

    /// Lock several live rows in ascending id order
    pub(crate) async fn lock_many(
        conn: &mut PgConnection,
        storage_item_ids: &[Uuid],
    ) -> AppResult<Vec<StorageItem>> {
        let mut ids = storage_item_ids.to_vec();
        ids.sort();
        ids.dedup();

        let sql = format!(
            "SELECT {} FROM storage_items WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id FOR UPDATE",
            STORAGE_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, StorageItemRow>(&sql)
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await?;

        if rows.len() != ids.len() {
            return Err(AppError::NotFound("Storage item".to_string()));
        }

        rows.into_iter().map(StorageItemRow::into_domain).collect()
    }

    pub(crate) async fn compartment_exists(
        conn: &mut PgConnection,
        compartment_id: Uuid,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM storage_compartments WHERE id = $1)",
        )
        .bind(compartment_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    /// Id of the row holding `source`'s item in `compartment_id`, creating it
    /// with the source row's weights when the compartment has none yet
    pub(crate) async fn ensure_in_compartment(
        conn: &mut PgConnection,
        actor: Uuid,
        source: &StorageItem,
        compartment_id: Uuid,
    ) -> AppResult<Uuid> {
        if !Self::compartment_exists(conn, compartment_id).await? {
            return Err(AppError::NotFound("Storage compartment".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO storage_items (
                item_kind, item_id, compartment_id,
                weight_new, weight_used, weight_reground,
                created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (item_kind, item_id, compartment_id) WHERE deleted_at IS NULL DO NOTHING
            "#,
        )
        .bind(source.item.kind())
        .bind(source.item.id())
        .bind(compartment_id)
        .bind(source.weights.new)
        .bind(source.weights.used)
        .bind(source.weights.reground)
        .bind(actor)
        .execute(&mut *conn)
        .await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM storage_items
            WHERE item_kind = $1 AND item_id = $2 AND compartment_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(source.item.kind())
        .bind(source.item.id())
        .bind(compartment_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Apply a signed change to one condition of a locked row and persist it
    pub(crate) async fn apply_delta(
        conn: &mut PgConnection,
        actor: Uuid,
        item: &mut StorageItem,
        condition: Condition,
        delta: Decimal,
    ) -> AppResult<DeltaOutcome> {
        let outcome = item.apply_delta(condition, delta).map_err(|e| {
            tracing::warn!(storage_item_id = %item.id, %condition, %delta, "stock change rejected: {}", e);
            AppError::from(e)
        })?;

        let updated_at = sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
            r#"
            UPDATE storage_items
            SET quantity_new = $1, quantity_used = $2, quantity_reground = $3,
                updated_at = NOW(), updated_by = $4
            WHERE id = $5
            RETURNING updated_at
            "#,
        )
        .bind(item.quantities.new)
        .bind(item.quantities.used)
        .bind(item.quantities.reground)
        .bind(actor)
        .bind(item.id)
        .fetch_one(&mut *conn)
        .await?;
        item.updated_at = updated_at;

        Ok(outcome)
    }
}
