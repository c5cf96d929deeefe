//! Operator reports submitted to lifecycle transitions, with input
//! validation.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::types::DbId;

/// Maximum length of free-text stoppage notes.
pub const MAX_STOP_NOTES_LEN: u64 = 500;

/// A stoppage reported by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StopReport {
    #[validate(range(min = 1))]
    pub reason_id: DbId,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Totals reported when an order leaves the machine (finalize, suspend,
/// transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CompletionReport {
    /// Total good units produced for the order so far.
    #[validate(range(min = 0))]
    pub good_total: i64,
    /// Total rejected units for the order so far.
    #[validate(range(min = 0))]
    pub scrap_total: i64,
}

/// Quantities declared by the operator during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_declaration_not_empty"))]
pub struct ProductionDeclaration {
    #[validate(range(min = 0))]
    pub good: i64,
    #[validate(range(min = 0))]
    pub scrap: i64,
}

/// Supervisor sign-off for taking an order that is active on another
/// machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OverrideAuthorization {
    #[validate(range(min = 1))]
    pub authorized_by: DbId,
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
}

fn validate_declaration_not_empty(decl: &ProductionDeclaration) -> Result<(), ValidationError> {
    if decl.good == 0 && decl.scrap == 0 {
        return Err(ValidationError::new("empty_declaration"));
    }
    Ok(())
}

/// Units still to be logged for an order: the reported total minus what the
/// station already counted, never negative.
pub fn production_delta(good_total: i64, already_produced: u64) -> u64 {
    u64::try_from(good_total)
        .unwrap_or(0)
        .saturating_sub(already_produced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_remainder_over_counted() {
        assert_eq!(production_delta(120, 100), 20);
    }

    #[test]
    fn delta_is_zero_when_totals_match() {
        assert_eq!(production_delta(100, 100), 0);
    }

    #[test]
    fn delta_never_goes_negative() {
        assert_eq!(production_delta(80, 100), 0);
        assert_eq!(production_delta(-5, 0), 0);
    }

    #[test]
    fn stop_report_requires_reason() {
        let report = StopReport {
            reason_id: 0,
            notes: None,
        };
        assert!(report.validate().is_err());
    }

    #[test]
    fn stop_report_rejects_long_notes() {
        let report = StopReport {
            reason_id: 2,
            notes: Some("x".repeat(MAX_STOP_NOTES_LEN as usize + 1)),
        };
        assert!(report.validate().is_err());
    }

    #[test]
    fn completion_report_rejects_negative_totals() {
        let report = CompletionReport {
            good_total: -1,
            scrap_total: 0,
        };
        assert!(report.validate().is_err());
    }

    #[test]
    fn override_needs_a_reason() {
        let auth = OverrideAuthorization {
            authorized_by: 4,
            reason: String::new(),
        };
        assert!(auth.validate().is_err());
    }

    #[test]
    fn empty_declaration_is_rejected() {
        let decl = ProductionDeclaration { good: 0, scrap: 0 };
        assert!(decl.validate().is_err());
        let decl = ProductionDeclaration { good: 0, scrap: 2 };
        assert!(decl.validate().is_ok());
    }
}
