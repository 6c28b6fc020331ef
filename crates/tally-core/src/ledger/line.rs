//! Line subtotal math shared by tab and sale lines.

use crate::money::Money;
use crate::types::Discount;

/// Subtotal of one line: `quantity × unit_price − discount`, never negative.
///
/// The gross amount is rounded to the cent once; the discount is taken off
/// that rounded gross (percentage discounts are a share of the gross).
///
/// ## Example
/// ```rust
/// use tally_core::ledger::line_subtotal;
/// use tally_core::{Discount, Money};
///
/// let price = Money::from_cents(400);
/// assert_eq!(line_subtotal(3.0, price, &Discount::none()).cents(), 1200);
/// assert_eq!(line_subtotal(3.0, price, &Discount::percentage(10.0)).cents(), 1080);
/// assert_eq!(line_subtotal(1.0, price, &Discount::fixed(Money::from_cents(900))).cents(), 0);
/// ```
pub fn line_subtotal(quantity: f64, unit_price: Money, discount: &Discount) -> Money {
    let gross = unit_price.multiply_quantity(quantity);
    (gross - discount.amount_off(gross)).clamp_non_negative()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_subtotal_fixed_discount() {
        let subtotal = line_subtotal(2.0, Money::from_cents(500), &Discount::fixed(Money::from_cents(150)));
        assert_eq!(subtotal.cents(), 850);
    }

    #[test]
    fn test_line_subtotal_fractional_quantity() {
        // 0.75 kg at $12.99/kg = 9.7425 → $9.74
        let subtotal = line_subtotal(0.75, Money::from_cents(1299), &Discount::none());
        assert_eq!(subtotal.cents(), 974);
    }

    #[test]
    fn test_line_subtotal_never_negative() {
        let subtotal = line_subtotal(1.0, Money::from_cents(100), &Discount::percentage(100.0));
        assert_eq!(subtotal, Money::zero());
    }
}
