use std::fmt::Display;

use askama::Result;

// Two-decimal money display, `{{ total|money }}` in templates.
pub fn money<T: Display>(value: T) -> Result<String> {
    Ok(format!("{:.2}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn money_pads_to_two_decimals() {
        assert_eq!(money(Decimal::new(125, 1)).unwrap(), "12.50");
        assert_eq!(money(&Decimal::ZERO).unwrap(), "0.00");
    }
}
