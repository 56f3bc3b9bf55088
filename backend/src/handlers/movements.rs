//! HTTP handlers for stock movements

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::StockMovement;
use crate::services::movement::{MovementFilter, MovementService, RecordMovementInput};
use crate::AppState;

/// Record an issue, receipt, transfer, adjustment or scrap
pub async fn record_movement(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    let service = MovementService::new(state.db);
    let movement = service.record(user.id(), input).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Movement history of a storage row
pub async fn list_movements(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Query(filter): Query<MovementFilter>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = MovementService::new(state.db);
    let movements = service.list_movements(item_id, filter).await?;
    Ok(Json(movements))
}
