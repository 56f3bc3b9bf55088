//! WebAssembly module for Shop Floor Inventory
//!
//! Provides client-side computation for:
//! - Effective stock and low-stock checks while editing weights
//! - Fill level against the configured maximum
//! - Outstanding quantity on a purchase order line
//! - Order number formatting

use rust_decimal::Decimal;
use std::str::FromStr;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("Invalid {}: {}", field, e))
}

fn to_js(message: String) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

fn effective_stock_of(quantities_json: &str, weights_json: &str) -> Result<Decimal, String> {
    let quantities: ConditionQuantities = serde_json::from_str(quantities_json)
        .map_err(|e| format!("Invalid quantities JSON: {}", e))?;
    let weights: ConditionWeights = serde_json::from_str(weights_json)
        .map_err(|e| format!("Invalid weights JSON: {}", e))?;
    weights.validate().map_err(|e| e.to_string())?;

    Ok(effective_stock(&quantities, &weights))
}

fn low_stock_of(effective: &str, reorder_point: &str, enabled: bool) -> Result<bool, String> {
    let thresholds = StockThresholds {
        reorder_point: Some(parse_decimal("reorder_point", reorder_point)?),
        enable_low_stock_alert: enabled,
        ..Default::default()
    };
    Ok(is_low_stock(parse_decimal("effective", effective)?, &thresholds))
}

fn outstanding_of(ordered: &str, received: &str) -> Result<Decimal, String> {
    let progress = LineProgress {
        line_number: 1,
        quantity_ordered: parse_decimal("quantity_ordered", ordered)?,
        quantity_received: parse_decimal("quantity_received", received)?,
    };
    if progress.quantity_received < Decimal::ZERO {
        return Err("Invalid quantity_received: must not be negative".to_string());
    }
    if progress.quantity_received > progress.quantity_ordered {
        return Err(format!(
            "Received {} exceeds ordered {}",
            progress.quantity_received, progress.quantity_ordered
        ));
    }
    Ok(progress.outstanding())
}

/// Weighted stock from `{"new","used","reground"}` quantity and weight objects.
/// Returned as a decimal string to keep full precision.
#[wasm_bindgen]
pub fn calculate_effective_stock(quantities_json: &str, weights_json: &str) -> Result<String, JsValue> {
    effective_stock_of(quantities_json, weights_json)
        .map(|d| d.normalize().to_string())
        .map_err(to_js)
}

/// Low-stock flag for an effective stock value, inclusive of the reorder point
#[wasm_bindgen]
pub fn check_low_stock(effective: &str, reorder_point: &str, enabled: bool) -> Result<bool, JsValue> {
    low_stock_of(effective, reorder_point, enabled).map_err(to_js)
}

/// Fill percentage, or `undefined` when no positive maximum is set
#[wasm_bindgen]
pub fn calculate_stock_level_percent(total: &str, max_quantity: &str) -> Option<String> {
    let total = parse_decimal("total", total).ok()?;
    let max = parse_decimal("max_quantity", max_quantity).ok();
    stock_level_percent(total, max).map(|p| p.to_string())
}

#[wasm_bindgen]
pub fn calculate_outstanding_quantity(ordered: &str, received: &str) -> Result<String, JsValue> {
    outstanding_of(ordered, received)
        .map(|d| d.normalize().to_string())
        .map_err(to_js)
}

#[wasm_bindgen]
pub fn format_order_number(year: i32, sequence: u32) -> String {
    OrderNumber::format(year, i64::from(sequence)).into_inner()
}
