//! Per-year purchase order number allocation

use sqlx::PgConnection;

use crate::error::{AppError, AppResult};
use crate::models::OrderNumber;

/// Hands out `PO-<year>-<NNNN>` numbers from a locked per-year counter.
///
/// The allocation runs on the caller's transaction, so the counter bump is
/// rolled back together with an order that fails to insert.
pub struct OrderNumberAllocator;

impl OrderNumberAllocator {
    /// Reserve the next number for `year`.
    ///
    /// The upsert takes a row lock on the year's counter: concurrent callers
    /// for the same year queue behind it until the holder commits. The first
    /// allocation of a year seeds from the highest number already on file.
    pub async fn allocate(conn: &mut PgConnection, year: i32) -> AppResult<OrderNumber> {
        if !(1000..=9999).contains(&year) {
            return Err(AppError::validation(
                "order_date",
                format!("Year {} cannot be used in an order number", year),
            ));
        }

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO purchase_order_sequences (year, last_value)
            SELECT $1, COALESCE(MAX(CAST(substring(order_number FROM '^PO-[0-9]{4}-([0-9]+)$') AS BIGINT)), 0) + 1
            FROM purchase_orders
            WHERE order_number LIKE $2
            ON CONFLICT (year) DO UPDATE
                SET last_value = purchase_order_sequences.last_value + 1,
                    updated_at = NOW()
            RETURNING last_value
            "#,
        )
        .bind(year)
        .bind(format!("PO-{}-%", year))
        .fetch_one(&mut *conn)
        .await?;

        let number = OrderNumber::format(year, sequence);
        tracing::debug!(order_number = %number, "allocated order number");

        Ok(number)
    }
}
