//! Cart and order totals.

use rust_decimal::Decimal;
use serde::Serialize;

/// Flat sales tax applied to every cart, in percent.
pub const TAX_PERCENT: u32 = 2;

/// Tax owed on `total`, rounded to cents (banker's rounding).
#[must_use]
pub fn tax_for(total: Decimal) -> Decimal {
    (total * Decimal::from(TAX_PERCENT) / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Aggregated figures shown on the cart, checkout and payment pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of line quantities.
    pub quantity: i64,
    /// Sum of `quantity × unit price` over all lines.
    pub total: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

impl CartTotals {
    /// Totals for an empty cart.
    pub const EMPTY: Self = Self {
        quantity: 0,
        total: Decimal::ZERO,
        tax: Decimal::ZERO,
        grand_total: Decimal::ZERO,
    };

    /// Computes totals from `(quantity, unit_price)` pairs.
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = (i32, Decimal)>,
    {
        let (quantity, total) = lines.into_iter().fold(
            (0_i64, Decimal::ZERO),
            |(quantity, total), (line_quantity, unit_price)| {
                (
                    quantity + i64::from(line_quantity),
                    total + unit_price * Decimal::from(line_quantity),
                )
            },
        );
        let tax = tax_for(total);

        Self {
            quantity,
            total,
            tax,
            grand_total: total + tax,
        }
    }
}

/// Sum of `quantity × frozen price` for order lines.
pub fn order_subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (i32, Decimal)>,
{
    lines
        .into_iter()
        .map(|(quantity, price)| price * Decimal::from(quantity))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_scenario() {
        let totals = CartTotals::from_lines([(2, Decimal::new(5000, 2))]);
        assert_eq!(totals.quantity, 2);
        assert_eq!(totals.total, Decimal::new(10000, 2));
        assert_eq!(totals.tax, Decimal::new(200, 2));
        assert_eq!(totals.grand_total, Decimal::new(10200, 2));
    }

    #[test]
    fn multiple_lines_sum_quantity_and_price() {
        let totals = CartTotals::from_lines([
            (1, Decimal::new(1999, 2)),
            (3, Decimal::new(250, 2)),
        ]);
        assert_eq!(totals.quantity, 4);
        assert_eq!(totals.total, Decimal::new(2749, 2));
        // 27.49 * 0.02 = 0.5498 -> 0.55
        assert_eq!(totals.tax, Decimal::new(55, 2));
        assert_eq!(totals.grand_total, Decimal::new(2804, 2));
    }

    #[test]
    fn empty_cart_is_all_zero() {
        let totals = CartTotals::from_lines(std::iter::empty());
        assert_eq!(totals, CartTotals::EMPTY);
    }

    #[test]
    fn tax_rounds_half_to_even() {
        // 0.25 * 0.02 = 0.005 -> 0.00 under banker's rounding
        assert_eq!(tax_for(Decimal::new(25, 2)), Decimal::ZERO);
        // 0.75 * 0.02 = 0.015 -> 0.02
        assert_eq!(tax_for(Decimal::new(75, 2)), Decimal::new(2, 2));
    }

    #[test]
    fn order_subtotal_uses_frozen_prices() {
        let subtotal = order_subtotal([(2, Decimal::new(1050, 2)), (1, Decimal::new(100, 2))]);
        assert_eq!(subtotal, Decimal::new(2200, 2));
    }
}
