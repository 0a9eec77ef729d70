//! Money arithmetic for invoices and their line items.
//!
//! Every stored amount is rounded to cents with midpoint-away-from-zero, and
//! invoice aggregates are sums of already-rounded line values, so
//! `total == subtotal + tax_amount` holds exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::ServiceError;

const MONEY_SCALE: u32 = 2;

/// Largest quantity accepted on a single line
pub const MAX_QUANTITY: Decimal = dec!(1000000);
/// Largest unit price accepted on a single line
pub const MAX_UNIT_PRICE: Decimal = dec!(1000000000);
/// Ceiling for any stored aggregate; the money columns hold twelve integer digits
pub const MAX_AMOUNT: Decimal = dec!(100000000000);

/// Rounds to cents and fixes the scale so values serialize as `"12.30"`.
pub fn money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Quantities and rates keep up to four decimal places.
pub fn quantity(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineAmounts {
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: money(Decimal::ZERO),
            tax_amount: money(Decimal::ZERO),
            total: money(Decimal::ZERO),
        }
    }
}

/// Checks the inputs of a single line before any arithmetic happens
pub fn validate_line(
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if quantity > MAX_QUANTITY {
        return Err(ServiceError::ValidationError(format!(
            "quantity must not exceed {}",
            MAX_QUANTITY
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "unit_price must not be negative".to_string(),
        ));
    }
    if unit_price > MAX_UNIT_PRICE {
        return Err(ServiceError::ValidationError(format!(
            "unit_price must not exceed {}",
            MAX_UNIT_PRICE
        )));
    }
    if tax_rate < Decimal::ZERO || tax_rate > dec!(100) {
        return Err(ServiceError::ValidationError(
            "tax_rate must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

fn amount_too_large() -> ServiceError {
    ServiceError::ValidationError(format!("amounts must not exceed {}", MAX_AMOUNT))
}

/// Adds two money values, rejecting results beyond [`MAX_AMOUNT`]
pub fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, ServiceError> {
    a.checked_add(b)
        .filter(|sum| *sum <= MAX_AMOUNT)
        .ok_or_else(amount_too_large)
}

/// amount = quantity × unit_price, tax = amount × rate / 100, total = amount + tax
pub fn line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
) -> Result<LineAmounts, ServiceError> {
    let amount = quantity
        .checked_mul(unit_price)
        .map(money)
        .filter(|amount| *amount <= MAX_AMOUNT)
        .ok_or_else(amount_too_large)?;
    let tax_amount = amount
        .checked_mul(tax_rate)
        .and_then(|tax| tax.checked_div(Decimal::ONE_HUNDRED))
        .map(money)
        .ok_or_else(amount_too_large)?;
    Ok(LineAmounts {
        amount,
        tax_amount,
        total: money(checked_sum(amount, tax_amount)?),
    })
}

/// Sums line values into invoice aggregates. An empty set yields zeros.
pub fn invoice_totals<'a, I>(lines: I) -> Result<InvoiceTotals, ServiceError>
where
    I: IntoIterator<Item = &'a LineAmounts>,
{
    let (subtotal, tax_amount) = lines.into_iter().try_fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sub, tax), line| -> Result<_, ServiceError> {
            Ok((
                checked_sum(sub, line.amount)?,
                checked_sum(tax, line.tax_amount)?,
            ))
        },
    )?;

    let subtotal = money(subtotal);
    let tax_amount = money(tax_amount);
    Ok(InvoiceTotals {
        subtotal,
        tax_amount,
        total: money(checked_sum(subtotal, tax_amount)?),
    })
}

/// Outstanding balance, never negative
pub fn balance_due(total: Decimal, paid: Decimal) -> Decimal {
    money((total - paid).max(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[test]
    fn line_amounts_apply_percentage_tax() {
        let line = line_amounts(dec!(3), dec!(19.99), dec!(20)).unwrap();
        assert_eq!(line.amount, dec!(59.97));
        assert_eq!(line.tax_amount, dec!(11.99));
        assert_eq!(line.total, dec!(71.96));
    }

    #[rstest]
    #[case(dec!(1), dec!(0.125), dec!(0), dec!(0.13))]
    #[case(dec!(1), dec!(-0.125), dec!(0), dec!(-0.13))]
    #[case(dec!(2.5), dec!(4), dec!(0), dec!(10.00))]
    fn amounts_round_half_away_from_zero(
        #[case] qty: Decimal,
        #[case] price: Decimal,
        #[case] rate: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(line_amounts(qty, price, rate).unwrap().amount, expected);
    }

    #[test]
    fn invoice_totals_sum_rounded_lines() {
        let lines = vec![
            line_amounts(dec!(1), dec!(100), dec!(10)).unwrap(),
            line_amounts(dec!(2), dec!(25.50), dec!(0)).unwrap(),
            line_amounts(dec!(1), dec!(0.333), dec!(20)).unwrap(),
        ];
        let totals = invoice_totals(&lines).unwrap();
        assert_eq!(totals.subtotal, dec!(151.33));
        assert_eq!(totals.tax_amount, dec!(10.07));
        assert_eq!(totals.total, dec!(161.40));
        assert_eq!(totals.total, totals.subtotal + totals.tax_amount);
    }

    #[test]
    fn empty_invoice_has_zero_totals() {
        let totals = invoice_totals(&Vec::<LineAmounts>::new()).unwrap();
        assert_eq!(totals, InvoiceTotals::zero());
    }

    #[test]
    fn money_fixes_scale() {
        assert_eq!(money(dec!(12.3)).to_string(), "12.30");
        assert_eq!(money(dec!(110.00000000001)).to_string(), "110.00");
    }

    #[test]
    fn balance_never_goes_negative() {
        assert_eq!(balance_due(dec!(100), dec!(40)), dec!(60));
        assert_eq!(balance_due(dec!(100), dec!(100)), dec!(0));
        assert_eq!(balance_due(dec!(100), dec!(120)), dec!(0));
    }

    #[test]
    fn line_validation_rejects_bad_inputs() {
        assert!(validate_line(dec!(1), dec!(0), dec!(0)).is_ok());
        assert_matches!(
            validate_line(dec!(0), dec!(10), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_line(dec!(1), dec!(-1), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_line(dec!(1), dec!(10), dec!(100.01)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_line(MAX_QUANTITY + dec!(1), dec!(10), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_line(dec!(1), MAX_UNIT_PRICE + dec!(0.01), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn oversized_arithmetic_is_an_error_not_a_panic() {
        let huge = dec!(1000000000000000);
        assert_matches!(
            line_amounts(huge, huge, dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            line_amounts(MAX_QUANTITY, MAX_UNIT_PRICE, dec!(20)),
            Err(ServiceError::ValidationError(_))
        );

        let line = line_amounts(dec!(1), MAX_UNIT_PRICE, dec!(100)).unwrap();
        let lines = vec![line; 120];
        assert_matches!(invoice_totals(&lines), Err(ServiceError::ValidationError(_)));
        assert_matches!(checked_sum(Decimal::MAX, dec!(1)), Err(ServiceError::ValidationError(_)));
    }
}
