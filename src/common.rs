/// Common types and utilities shared across handlers and services
use rust_decimal::Decimal;

/// Minor currency units per major unit for every supported currency
pub const MINOR_UNITS: u32 = 2;

/// Renders a stored minor-unit amount as a two-decimal value
pub fn money(cents: i64) -> Decimal {
    Decimal::new(cents, MINOR_UNITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn renders_minor_units() {
        assert_eq!(money(1999), dec!(19.99));
        assert_eq!(money(5), dec!(0.05));
        assert_eq!(money(0), dec!(0.00));
    }
}
