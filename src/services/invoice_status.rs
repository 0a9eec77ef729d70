//! Invoice lifecycle rules.

use crate::entities::InvoiceStatus;
use crate::errors::ServiceError;

/// Validates if a status transition is allowed
pub fn is_valid_transition(from: InvoiceStatus, to: InvoiceStatus) -> bool {
    use InvoiceStatus::*;

    match (from, to) {
        // From draft
        (Draft, Sent) => true,
        (Draft, Cancelled) => true,

        // From sent
        (Sent, Viewed) => true,
        (Sent, Paid) => true,
        (Sent, Cancelled) => true,

        // From viewed
        (Viewed, Paid) => true,
        (Viewed, Cancelled) => true,

        // From paid
        (Paid, Refunded) => true,

        // Cancelled and refunded are terminal; same-state moves are rejected
        _ => false,
    }
}

/// Like [`is_valid_transition`] but with an error describing the rejection
pub fn ensure_transition(from: InvoiceStatus, to: InvoiceStatus) -> Result<(), ServiceError> {
    if from == to {
        return Err(ServiceError::InvalidStatus(format!(
            "Invoice is already {}",
            to
        )));
    }
    if !is_valid_transition(from, to) {
        return Err(ServiceError::InvalidStatus(format!(
            "Cannot change invoice status from {} to {}",
            from, to
        )));
    }
    Ok(())
}

/// Statuses reachable from `from`
pub fn allowed_transitions(from: InvoiceStatus) -> Vec<InvoiceStatus> {
    use sea_orm::Iterable;

    InvoiceStatus::iter()
        .filter(|to| is_valid_transition(from, *to))
        .collect()
}

/// Header fields and line items may change only before payment or cancellation
pub fn is_editable(status: InvoiceStatus) -> bool {
    matches!(
        status,
        InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Viewed
    )
}

pub fn ensure_editable(status: InvoiceStatus) -> Result<(), ServiceError> {
    if is_editable(status) {
        Ok(())
    } else {
        Err(ServiceError::InvalidOperation(format!(
            "Invoice in status {} can no longer be modified",
            status
        )))
    }
}

/// Payments may be recorded only against an issued, unpaid invoice
pub fn accepts_payment(status: InvoiceStatus) -> bool {
    matches!(status, InvoiceStatus::Sent | InvoiceStatus::Viewed)
}

pub fn is_terminal(status: InvoiceStatus) -> bool {
    allowed_transitions(status).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::Iterable;
    use test_case::test_case;
    use InvoiceStatus::*;

    #[test_case(Draft, Sent; "draft to sent")]
    #[test_case(Draft, Cancelled; "draft to cancelled")]
    #[test_case(Sent, Viewed; "sent to viewed")]
    #[test_case(Sent, Paid; "sent to paid")]
    #[test_case(Sent, Cancelled; "sent to cancelled")]
    #[test_case(Viewed, Paid; "viewed to paid")]
    #[test_case(Viewed, Cancelled; "viewed to cancelled")]
    #[test_case(Paid, Refunded; "paid to refunded")]
    fn allowed(from: InvoiceStatus, to: InvoiceStatus) {
        assert!(is_valid_transition(from, to));
        assert!(ensure_transition(from, to).is_ok());
    }

    #[test_case(Draft, Paid; "draft cannot skip to paid")]
    #[test_case(Draft, Viewed; "draft cannot be viewed")]
    #[test_case(Paid, Cancelled; "paid cannot be cancelled")]
    #[test_case(Cancelled, Draft; "cancelled is terminal")]
    #[test_case(Refunded, Paid; "refunded is terminal")]
    #[test_case(Viewed, Sent; "no going back")]
    fn rejected(from: InvoiceStatus, to: InvoiceStatus) {
        assert!(!is_valid_transition(from, to));
        assert_matches!(
            ensure_transition(from, to),
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[test]
    fn same_state_is_rejected() {
        for status in InvoiceStatus::iter() {
            assert_matches!(
                ensure_transition(status, status),
                Err(ServiceError::InvalidStatus(_))
            );
        }
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(Cancelled));
        assert!(is_terminal(Refunded));
        assert!(!is_terminal(Paid));
        assert_eq!(allowed_transitions(Draft), vec![Sent, Cancelled]);
    }

    #[test]
    fn editability_follows_payment() {
        assert!(is_editable(Draft));
        assert!(is_editable(Viewed));
        assert!(!is_editable(Paid));
        assert!(!is_editable(Cancelled));
        assert!(ensure_editable(Refunded).is_err());
    }
}
