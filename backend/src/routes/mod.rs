//! Route definitions for the Shop Floor Inventory service

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .nest("/stock", stock_routes(state.clone()))
        .nest("/movements", movement_routes(state.clone()))
        .nest("/purchase-orders", purchase_order_routes(state))
}

/// Storage ledger routes (protected)
fn stock_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_stock).post(handlers::create_storage_item),
        )
        .route("/low", get(handlers::list_low_stock))
        .route(
            "/:item_id",
            get(handlers::get_stock)
                .put(handlers::update_settings)
                .delete(handlers::deactivate_storage_item),
        )
        .route("/:item_id/movements", get(handlers::list_movements))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Movement routes (protected)
fn movement_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::record_movement))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Purchase order routes (protected)
fn purchase_order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/send", post(handlers::send_order))
        .route("/:order_id/confirm", post(handlers::confirm_order))
        .route("/:order_id/cancel", post(handlers::cancel_order))
        .route(
            "/:order_id/lines/:line_id/receive",
            post(handlers::receive_line),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
