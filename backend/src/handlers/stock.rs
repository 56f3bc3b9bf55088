//! HTTP handlers for stock endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::StockView;
use crate::services::ledger::{
    CreateStorageItemInput, LedgerService, StockFilter, UpdateStorageSettingsInput,
};
use crate::AppState;

/// List stock rows
pub async fn list_stock(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<StockFilter>,
) -> AppResult<Json<Vec<StockView>>> {
    let service = LedgerService::new(state.db);
    let stock = service.list_stock(filter).await?;
    Ok(Json(stock))
}

/// Rows at or below their reorder point
pub async fn list_low_stock(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<StockView>>> {
    let service = LedgerService::new(state.db);
    let stock = service.list_low_stock().await?;
    Ok(Json(stock))
}

/// Register an item in a compartment
pub async fn create_storage_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateStorageItemInput>,
) -> AppResult<(StatusCode, Json<StockView>)> {
    let service = LedgerService::new(state.db);
    let view = service.create_storage_item(user.id(), input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get current stock of one row
pub async fn get_stock(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<StockView>> {
    let service = LedgerService::new(state.db);
    let view = service.get_stock(item_id).await?;
    Ok(Json(view))
}

/// Replace weights and thresholds
pub async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateStorageSettingsInput>,
) -> AppResult<Json<StockView>> {
    let service = LedgerService::new(state.db);
    let view = service.update_settings(user.id(), item_id, input).await?;
    Ok(Json(view))
}

/// Soft delete a storage row
pub async fn deactivate_storage_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = LedgerService::new(state.db);
    service.deactivate(user.id(), item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
