//! Property-based tests for invoice arithmetic and the status lifecycle.

use invoicing_api::entities::InvoiceStatus;
use invoicing_api::services::{
    invoice_status::{accepts_payment, allowed_transitions, is_editable, is_valid_transition},
    totals::{
        balance_due, invoice_totals, line_amounts, money, validate_line, LineAmounts, MAX_QUANTITY,
    },
    users::format_invoice_number,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use sea_orm::Iterable;

fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000, 0u32..4).prop_map(|(units, scale)| Decimal::new(units, scale))
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|basis_points| Decimal::new(basis_points, 2))
}

fn status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop::sample::select(InvoiceStatus::iter().collect::<Vec<_>>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn line_total_is_amount_plus_tax(
        quantity in quantity_strategy(),
        price in price_strategy(),
        rate in rate_strategy(),
    ) {
        let line = line_amounts(quantity, price, rate).unwrap();
        prop_assert_eq!(line.total, line.amount + line.tax_amount);
        prop_assert!(line.amount >= Decimal::ZERO);
        prop_assert!(line.tax_amount <= line.amount);
        prop_assert_eq!(line.amount, money(line.amount));
    }

    #[test]
    fn invoice_total_is_subtotal_plus_tax(
        lines in prop::collection::vec(
            (quantity_strategy(), price_strategy(), rate_strategy()),
            0..20,
        )
    ) {
        let amounts: Vec<LineAmounts> = lines
            .iter()
            .map(|(q, p, r)| line_amounts(*q, *p, *r).unwrap())
            .collect();
        let totals = invoice_totals(&amounts).unwrap();

        prop_assert_eq!(totals.total, totals.subtotal + totals.tax_amount);
        let expected: Decimal = amounts.iter().map(|l| l.amount).sum();
        prop_assert_eq!(totals.subtotal, expected);
    }

    #[test]
    fn balance_due_never_negative(total in price_strategy(), paid in price_strategy()) {
        let balance = balance_due(total, paid);
        prop_assert!(balance >= Decimal::ZERO);
        if paid <= total {
            prop_assert_eq!(balance + paid, total);
        }
    }

    #[test]
    fn oversized_lines_are_rejected_without_panicking(
        units in 1i64..i64::MAX,
        price in price_strategy(),
    ) {
        let quantity = MAX_QUANTITY + Decimal::from(units);
        prop_assert!(validate_line(quantity, price, Decimal::ZERO).is_err());
        let _ = line_amounts(quantity, quantity, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn same_status_is_never_a_transition(status in status_strategy()) {
        prop_assert!(!is_valid_transition(status, status));
    }

    #[test]
    fn reachable_states_match_transition_table(from in status_strategy(), to in status_strategy()) {
        prop_assert_eq!(
            allowed_transitions(from).contains(&to),
            is_valid_transition(from, to)
        );
    }

    #[test]
    fn payable_states_are_editable(status in status_strategy()) {
        if accepts_payment(status) {
            prop_assert!(is_editable(status));
            prop_assert!(is_valid_transition(status, InvoiceStatus::Paid));
        }
    }

    #[test]
    fn invoice_numbers_sort_by_sequence(seq in 1i32..999_999, year in 2000i32..2100) {
        let current = format_invoice_number("INV", year, seq);
        let next = format_invoice_number("INV", year, seq + 1);
        prop_assert!(current < next);
        prop_assert_eq!(current.len(), next.len());
    }
}

#[test]
fn every_status_is_reachable_from_draft() {
    let mut seen = vec![InvoiceStatus::Draft];
    let mut frontier = vec![InvoiceStatus::Draft];
    while let Some(status) = frontier.pop() {
        for next in allowed_transitions(status) {
            if !seen.contains(&next) {
                seen.push(next);
                frontier.push(next);
            }
        }
    }
    assert_eq!(seen.len(), InvoiceStatus::iter().count());
}
