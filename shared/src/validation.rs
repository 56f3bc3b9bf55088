//! Validation utilities for ledger and procurement input

use rust_decimal::Decimal;

/// Validate an ISO 4217 style currency code (three uppercase letters)
pub fn validate_currency_code(code: &str) -> Result<(), &'static str> {
    if code.len() != 3 {
        return Err("Currency code must be 3 letters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err("Currency code must be uppercase letters only");
    }
    Ok(())
}

/// Validate a unit of measure label (e.g. "pcs", "m", "box")
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    let trimmed = unit.trim();
    if trimmed.is_empty() {
        return Err("Unit cannot be empty");
    }
    if trimmed.len() > 20 {
        return Err("Unit must be at most 20 characters");
    }
    Ok(())
}

// Decimal::from_parts(lo, mid, hi, negative, scale) over the 96-bit mantissa

/// Largest quantity a `NUMERIC(12,3)` ledger column holds, 999999999.999
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 3);

/// Largest unit price a `NUMERIC(12,2)` column holds, 9999999999.99
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Largest amount a `NUMERIC(18,5)` total column holds, 9999999999999.99999
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 5);

/// Validate that a quantity (signed for adjustments) fits the ledger
/// columns: at most three decimal places and within ±`MAX_QUANTITY`
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.normalize().scale() > 3 {
        return Err("Quantity supports at most 3 decimal places");
    }
    if quantity.abs() > MAX_QUANTITY {
        return Err("Quantity must not exceed 999999999.999");
    }
    Ok(())
}

/// Validate that a unit price fits two decimal places and `MAX_UNIT_PRICE`
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price.normalize().scale() > 2 {
        return Err("Price supports at most 2 decimal places");
    }
    if price.abs() > MAX_UNIT_PRICE {
        return Err("Price must not exceed 9999999999.99");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_currency_codes() {
        assert!(validate_currency_code("EUR").is_ok());
        assert!(validate_currency_code("CHF").is_ok());
        assert!(validate_currency_code("eur").is_err());
        assert!(validate_currency_code("EURO").is_err());
        assert!(validate_currency_code("E1R").is_err());
    }

    #[test]
    fn test_units() {
        assert!(validate_unit("pcs").is_ok());
        assert!(validate_unit("  ").is_err());
        assert!(validate_unit("a-very-long-unit-name-here").is_err());
    }

    #[test]
    fn test_quantity_precision() {
        assert!(validate_quantity(Decimal::from_str("1.125").unwrap()).is_ok());
        assert!(validate_quantity(Decimal::from_str("1.5000").unwrap()).is_ok());
        assert!(validate_quantity(Decimal::from_str("1.1255").unwrap()).is_err());
    }

    #[test]
    fn test_quantity_magnitude() {
        assert_eq!(MAX_QUANTITY, Decimal::from_str("999999999.999").unwrap());
        assert!(validate_quantity(MAX_QUANTITY).is_ok());
        assert!(validate_quantity(-MAX_QUANTITY).is_ok());
        assert!(validate_quantity(Decimal::from_str("1000000000").unwrap()).is_err());
        assert!(validate_quantity(Decimal::from_str("-1000000000").unwrap()).is_err());
        assert!(validate_quantity(Decimal::MAX).is_err());
    }

    #[test]
    fn test_price_precision() {
        assert!(validate_unit_price(Decimal::from_str("12.50").unwrap()).is_ok());
        assert!(validate_unit_price(Decimal::from_str("12.505").unwrap()).is_err());
    }

    #[test]
    fn test_price_magnitude() {
        assert_eq!(MAX_UNIT_PRICE, Decimal::from_str("9999999999.99").unwrap());
        assert_eq!(MAX_AMOUNT, Decimal::from_str("9999999999999.99999").unwrap());
        assert!(validate_unit_price(MAX_UNIT_PRICE).is_ok());
        assert!(validate_unit_price(Decimal::from_str("10000000000").unwrap()).is_err());
        assert!(validate_unit_price(Decimal::MAX).is_err());
    }
}
