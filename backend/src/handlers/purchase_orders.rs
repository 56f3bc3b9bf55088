//! HTTP handlers for purchase orders

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{PurchaseOrder, PurchaseOrderWithItems};
use crate::services::procurement::{
    CreatePurchaseOrderInput, LineReceipt, OrderFilter, ProcurementService, ReceiveLineInput,
};
use crate::AppState;

fn service(state: AppState) -> ProcurementService {
    ProcurementService::new(state.db, state.config.procurement.clone())
}

/// List purchase orders
pub async fn list_orders(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<PurchaseOrder>>> {
    let orders = service(state).list_orders(filter).await?;
    Ok(Json(orders))
}

/// Create a draft purchase order
pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreatePurchaseOrderInput>,
) -> AppResult<(StatusCode, Json<PurchaseOrderWithItems>)> {
    let order = service(state).create_order(user.id(), input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get a purchase order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderWithItems>> {
    let order = service(state).get_order(order_id).await?;
    Ok(Json(order))
}

/// Mark an order as sent
pub async fn send_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderWithItems>> {
    let order = service(state).send(user.id(), order_id).await?;
    Ok(Json(order))
}

/// Record supplier confirmation
pub async fn confirm_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderWithItems>> {
    let order = service(state).confirm(user.id(), order_id).await?;
    Ok(Json(order))
}

/// Cancel an open order
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderWithItems>> {
    let order = service(state).cancel(user.id(), order_id).await?;
    Ok(Json(order))
}

/// Receive goods against one order line
pub async fn receive_line(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((order_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<ReceiveLineInput>,
) -> AppResult<Json<LineReceipt>> {
    let receipt = service(state)
        .receive_line(user.id(), order_id, line_id, input)
        .await?;
    Ok(Json(receipt))
}
