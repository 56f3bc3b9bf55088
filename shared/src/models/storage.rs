//! Storage ledger models: condition-split stock per item and compartment

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::validation::{validate_quantity, MAX_QUANTITY};

/// Wear state of a physical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    Used,
    /// Resharpened
    Reground,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::New, Condition::Used, Condition::Reground];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Used => "used",
            Condition::Reground => "reground",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Condition::New),
            "used" => Ok(Condition::Used),
            "reground" => Ok(Condition::Reground),
            other => Err(LedgerError::InvalidCondition(other.to_string())),
        }
    }
}

/// Reference to the thing being stored.
///
/// A storage row holds either a tool (including inserts and accessories) or a
/// piece of measuring equipment, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Tool(Uuid),
    MeasuringEquipment(Uuid),
}

impl ItemRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemRef::Tool(_) => "tool",
            ItemRef::MeasuringEquipment(_) => "measuring_equipment",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ItemRef::Tool(id) | ItemRef::MeasuringEquipment(id) => *id,
        }
    }

    /// Rebuild from the `(item_kind, item_id)` column pair
    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, LedgerError> {
        match kind {
            "tool" => Ok(ItemRef::Tool(id)),
            "measuring_equipment" => Ok(ItemRef::MeasuringEquipment(id)),
            other => Err(LedgerError::InvalidItemKind(other.to_string())),
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, ItemRef::MeasuringEquipment(_))
    }
}

/// Quantity on hand per condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConditionQuantities {
    pub new: Decimal,
    pub used: Decimal,
    pub reground: Decimal,
}

impl ConditionQuantities {
    pub fn new(new: Decimal, used: Decimal, reground: Decimal) -> Self {
        Self { new, used, reground }
    }

    pub fn get(&self, condition: Condition) -> Decimal {
        match condition {
            Condition::New => self.new,
            Condition::Used => self.used,
            Condition::Reground => self.reground,
        }
    }

    fn set(&mut self, condition: Condition, value: Decimal) {
        match condition {
            Condition::New => self.new = value,
            Condition::Used => self.used = value,
            Condition::Reground => self.reground = value,
        }
    }

    pub fn total(&self) -> Decimal {
        self.new + self.used + self.reground
    }
}

/// Per-row weighting of each condition when computing effective stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionWeights {
    pub new: Decimal,
    pub used: Decimal,
    pub reground: Decimal,
}

impl ConditionWeights {
    pub fn new(new: Decimal, used: Decimal, reground: Decimal) -> Self {
        Self { new, used, reground }
    }

    /// Weights a freshly created storage row starts with (1.0 / 0.5 / 0.8)
    pub fn standard() -> Self {
        Self {
            new: Decimal::ONE,
            used: Decimal::new(5, 1),
            reground: Decimal::new(8, 1),
        }
    }

    pub fn get(&self, condition: Condition) -> Decimal {
        match condition {
            Condition::New => self.new,
            Condition::Used => self.used,
            Condition::Reground => self.reground,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        for condition in Condition::ALL {
            let value = self.get(condition);
            if value < Decimal::ZERO || value > Decimal::ONE || value.normalize().scale() > 3 {
                return Err(LedgerError::InvalidWeight { condition, value });
            }
        }
        Ok(())
    }
}

/// Reorder thresholds for a storage row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_quantity: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub max_quantity: Option<Decimal>,
    pub enable_low_stock_alert: bool,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            min_quantity: None,
            reorder_point: None,
            max_quantity: None,
            enable_low_stock_alert: true,
        }
    }
}

impl StockThresholds {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let fields = [
            ("min_quantity", self.min_quantity),
            ("reorder_point", self.reorder_point),
            ("max_quantity", self.max_quantity),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(LedgerError::InvalidThreshold(format!(
                        "{} must not be negative",
                        name
                    )));
                }
                validate_quantity(v)
                    .map_err(|msg| LedgerError::InvalidThreshold(format!("{}: {}", name, msg)))?;
            }
        }

        if let (Some(min), Some(max)) = (self.min_quantity, self.max_quantity) {
            if min > max {
                return Err(LedgerError::InvalidThreshold(
                    "min_quantity must not exceed max_quantity".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// One stock record: an item held in one storage compartment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub id: Uuid,
    pub item: ItemRef,
    pub compartment_id: Uuid,
    pub quantities: ConditionQuantities,
    pub weights: ConditionWeights,
    pub thresholds: StockThresholds,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Condition quantity before and after a single applied delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaOutcome {
    pub condition: Condition,
    pub delta: Decimal,
    pub before: Decimal,
    pub after: Decimal,
}

impl StorageItem {
    /// Apply a signed change to one condition quantity.
    ///
    /// The row is left untouched when the result would leave the storable
    /// range `0..=MAX_QUANTITY` or break the single-unit rule for measuring
    /// equipment.
    pub fn apply_delta(
        &mut self,
        condition: Condition,
        delta: Decimal,
    ) -> Result<DeltaOutcome, LedgerError> {
        let before = self.quantities.get(condition);
        let after = before
            .checked_add(delta)
            .filter(|a| *a <= MAX_QUANTITY)
            .ok_or_else(|| {
                LedgerError::InvalidQuantity(format!(
                    "{} stock of {} plus {} exceeds {}",
                    condition, before, delta, MAX_QUANTITY
                ))
            })?;

        if after < Decimal::ZERO {
            return Err(LedgerError::InsufficientStock {
                condition,
                available: before,
                requested: -delta,
            });
        }

        if self.item.is_singleton() {
            if condition != Condition::New {
                return Err(LedgerError::SingletonViolation(format!(
                    "only condition 'new' is tracked, got '{}'",
                    condition
                )));
            }
            if after != Decimal::ZERO && after != Decimal::ONE {
                return Err(LedgerError::SingletonViolation(format!(
                    "quantity must be 0 or 1, would become {}",
                    after
                )));
            }
        }

        self.quantities.set(condition, after);

        Ok(DeltaOutcome {
            condition,
            delta,
            before,
            after,
        })
    }

    pub fn view(&self) -> StockView {
        StockView::derive(self)
    }
}

/// Weighted stock: Σ quantity × weight over the three conditions
pub fn effective_stock(quantities: &ConditionQuantities, weights: &ConditionWeights) -> Decimal {
    Condition::ALL
        .iter()
        .map(|c| quantities.get(*c) * weights.get(*c))
        .sum()
}

/// Low-stock rule. Fires at or below the reorder point.
pub fn is_low_stock(effective: Decimal, thresholds: &StockThresholds) -> bool {
    match thresholds.reorder_point {
        Some(reorder_point) if thresholds.enable_low_stock_alert => effective <= reorder_point,
        _ => false,
    }
}

/// Fill level against `max_quantity`, rounded half away from zero to 2 places
pub fn stock_level_percent(total: Decimal, max_quantity: Option<Decimal>) -> Option<Decimal> {
    let max = max_quantity.filter(|m| *m > Decimal::ZERO)?;
    Some(
        (total / max * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    )
}

/// Read model of a storage row. Every derived field is computed from the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockView {
    pub storage_item_id: Uuid,
    pub item: ItemRef,
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
    pub total_stock: Decimal,
    pub effective_stock: Decimal,
    pub is_low_stock: bool,
    pub is_below_minimum: bool,
    pub stock_level_percent: Option<Decimal>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockView {
    pub fn derive(item: &StorageItem) -> Self {
        let q = &item.quantities;
        let w = &item.weights;
        let t = &item.thresholds;

        let total_stock = q.total();
        let effective = effective_stock(q, w);

        Self {
            storage_item_id: item.id,
            item: item.item,
            compartment_id: item.compartment_id,
            quantity_new: q.new,
            quantity_used: q.used,
            quantity_reground: q.reground,
            weight_new: w.new,
            weight_used: w.used,
            weight_reground: w.reground,
            min_quantity: t.min_quantity,
            reorder_point: t.reorder_point,
            max_quantity: t.max_quantity,
            enable_low_stock_alert: t.enable_low_stock_alert,
            total_stock,
            effective_stock: effective,
            is_low_stock: is_low_stock(effective, t),
            is_below_minimum: t.min_quantity.is_some_and(|min| total_stock < min),
            stock_level_percent: stock_level_percent(total_stock, t.max_quantity),
            is_active: item.is_active,
            updated_at: item.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tool_row(q: (&str, &str, &str)) -> StorageItem {
        StorageItem {
            id: Uuid::new_v4(),
            item: ItemRef::Tool(Uuid::new_v4()),
            compartment_id: Uuid::new_v4(),
            quantities: ConditionQuantities::new(dec(q.0), dec(q.1), dec(q.2)),
            weights: ConditionWeights::standard(),
            thresholds: StockThresholds::default(),
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_effective_stock_with_standard_weights() {
        let row = tool_row(("10", "5", "3"));
        let view = row.view();

        assert_eq!(view.total_stock, dec("18"));
        assert_eq!(view.effective_stock, dec("14.9"));
    }

    #[test]
    fn test_effective_stock_uses_row_weights() {
        let mut quarantine = tool_row(("10", "5", "3"));
        quarantine.weights = ConditionWeights::new(dec("1.0"), dec("0.5"), Decimal::ZERO);

        assert_eq!(quarantine.view().effective_stock, dec("12.5"));
    }

    #[test]
    fn test_low_stock_boundary_is_inclusive() {
        let thresholds = StockThresholds {
            reorder_point: Some(dec("10")),
            enable_low_stock_alert: true,
            ..Default::default()
        };

        assert!(is_low_stock(dec("10"), &thresholds));
        assert!(!is_low_stock(dec("10.01"), &thresholds));
        assert!(is_low_stock(dec("0"), &thresholds));
    }

    #[test]
    fn test_low_stock_requires_alert_flag_and_reorder_point() {
        let disabled = StockThresholds {
            reorder_point: Some(dec("10")),
            enable_low_stock_alert: false,
            ..Default::default()
        };
        assert!(!is_low_stock(dec("1"), &disabled));

        let no_point = StockThresholds::default();
        assert!(!is_low_stock(dec("0"), &no_point));
    }

    #[test]
    fn test_stock_level_percent() {
        assert_eq!(stock_level_percent(dec("18"), Some(dec("40"))), Some(dec("45")));
        assert_eq!(stock_level_percent(dec("1"), Some(dec("3"))), Some(dec("33.33")));
        assert_eq!(stock_level_percent(dec("2"), Some(dec("3"))), Some(dec("66.67")));
        assert_eq!(stock_level_percent(dec("5"), None), None);
        assert_eq!(stock_level_percent(dec("5"), Some(Decimal::ZERO)), None);
    }

    #[test]
    fn test_below_minimum_flag() {
        let mut row = tool_row(("2", "0", "0"));
        row.thresholds.min_quantity = Some(dec("3"));
        assert!(row.view().is_below_minimum);

        row.thresholds.min_quantity = Some(dec("2"));
        assert!(!row.view().is_below_minimum);
    }

    #[test]
    fn test_apply_delta_records_before_and_after() {
        let mut row = tool_row(("10", "0", "0"));
        let outcome = row.apply_delta(Condition::New, dec("-4")).unwrap();

        assert_eq!(outcome.before, dec("10"));
        assert_eq!(outcome.after, dec("6"));
        assert_eq!(outcome.after - outcome.before, outcome.delta);
        assert_eq!(row.quantities.new, dec("6"));
    }

    #[test]
    fn test_apply_delta_rejects_negative_result_and_leaves_row() {
        let mut row = tool_row(("10", "5", "3"));
        let before = row.quantities;

        let err = row.apply_delta(Condition::New, dec("-15")).unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                condition: Condition::New,
                available: dec("10"),
                requested: dec("15"),
            }
        );
        assert_eq!(row.quantities, before);
    }

    #[test]
    fn test_apply_delta_allows_fractional_quantities() {
        let mut row = tool_row(("0", "0", "0"));
        row.apply_delta(Condition::Used, dec("2.75")).unwrap();
        row.apply_delta(Condition::Used, dec("-2.75")).unwrap();
        assert_eq!(row.quantities.used, Decimal::ZERO);
    }

    #[test]
    fn test_measuring_equipment_is_singleton() {
        let mut row = tool_row(("0", "0", "0"));
        row.item = ItemRef::MeasuringEquipment(Uuid::new_v4());

        assert!(row.apply_delta(Condition::New, Decimal::ONE).is_ok());
        assert!(matches!(
            row.apply_delta(Condition::New, Decimal::ONE),
            Err(LedgerError::SingletonViolation(_))
        ));
        assert!(matches!(
            row.apply_delta(Condition::Used, Decimal::ONE),
            Err(LedgerError::SingletonViolation(_))
        ));
        assert_eq!(row.quantities.new, Decimal::ONE);
    }

    #[test]
    fn test_weights_validation() {
        assert!(ConditionWeights::standard().validate().is_ok());
        assert!(ConditionWeights::new(Decimal::ZERO, Decimal::ONE, dec("0.3"))
            .validate()
            .is_ok());

        let err = ConditionWeights::new(Decimal::ONE, dec("1.2"), Decimal::ONE)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidWeight {
                condition: Condition::Used,
                value: dec("1.2"),
            }
        );
        assert!(ConditionWeights::new(dec("-0.1"), Decimal::ONE, Decimal::ONE)
            .validate()
            .is_err());
    }

    #[test]
    fn test_thresholds_validation() {
        let ok = StockThresholds {
            min_quantity: Some(dec("2")),
            reorder_point: Some(dec("5")),
            max_quantity: Some(dec("20")),
            enable_low_stock_alert: true,
        };
        assert!(ok.validate().is_ok());

        let inverted = StockThresholds {
            min_quantity: Some(dec("30")),
            max_quantity: Some(dec("20")),
            ..ok
        };
        assert!(inverted.validate().is_err());

        let negative = StockThresholds {
            reorder_point: Some(dec("-1")),
            ..ok
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!(Condition::from_str("reground").unwrap(), Condition::Reground);
        assert_eq!(
            Condition::from_str("broken").unwrap_err(),
            LedgerError::InvalidCondition("broken".to_string())
        );
    }

    #[test]
    fn test_item_ref_round_trips_through_columns() {
        let id = Uuid::new_v4();
        let tool = ItemRef::Tool(id);
        assert_eq!(ItemRef::from_parts(tool.kind(), tool.id()).unwrap(), tool);
        assert!(ItemRef::from_parts("fixture", id).is_err());
    }

    #[test]
    fn test_item_ref_json_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(ItemRef::MeasuringEquipment(id)).unwrap();
        assert_eq!(json["kind"], "measuring_equipment");
        assert_eq!(json["id"], id.to_string());
    }

    #[test]
    fn test_apply_delta_rejects_overflow_and_leaves_row() {
        let mut row = tool_row(("1", "0", "0"));

        let err = row.apply_delta(Condition::New, Decimal::MAX).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));

        let err = row.apply_delta(Condition::New, MAX_QUANTITY).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));

        assert_eq!(row.quantities.new, Decimal::ONE);
        assert!(row.apply_delta(Condition::New, MAX_QUANTITY - Decimal::ONE).is_ok());
    }

    #[test]
    fn test_weights_limited_to_three_places() {
        assert!(ConditionWeights::new(Decimal::ONE, dec("0.334"), dec("0.8000"))
            .validate()
            .is_ok());

        let err = ConditionWeights::new(Decimal::ONE, dec("0.3335"), dec("0.8"))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidWeight {
                condition: Condition::Used,
                value: dec("0.3335"),
            }
        );
    }

    #[test]
    fn test_thresholds_must_fit_the_columns() {
        let over_precise = StockThresholds {
            reorder_point: Some(dec("10.0005")),
            ..Default::default()
        };
        assert!(matches!(
            over_precise.validate(),
            Err(LedgerError::InvalidThreshold(_))
        ));

        let oversized = StockThresholds {
            max_quantity: Some(dec("1000000000000")),
            ..Default::default()
        };
        assert!(matches!(
            oversized.validate(),
            Err(LedgerError::InvalidThreshold(_))
        ));

        let at_limit = StockThresholds {
            max_quantity: Some(MAX_QUANTITY),
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
    }
}
