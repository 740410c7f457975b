//! Structural sanity checks

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::pipeline::TaskItem;
use crate::types::{Transaction, TransactionType, Violation, ViolationCode};

/// Structural constraints plus internal-number and document-name presence
#[derive(Debug, Default, Clone, Copy)]
pub struct SanityCheckFields;

impl SanityCheckFields {
    const NAME: &'static str = "SanityCheckFields";

    fn earliest_entry_date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(1990, 1, 1)
    }

    fn constraint(tx: &mut Transaction, constraint: &str, item_id: Option<&str>) {
        let violation = match item_id {
            Some(id) => Violation::for_item(ViolationCode::TxValidationError, id, Self::NAME),
            None => Violation::for_transaction(ViolationCode::TxValidationError, Self::NAME),
        };
        tx.add_violation(violation.with_sub_code(constraint));
    }
}

impl TaskItem for SanityCheckFields {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.id.trim().is_empty() {
            Self::constraint(tx, "id_not_blank", None);
        }
        if tx.organisation.id.trim().is_empty() {
            Self::constraint(tx, "organisation_id_not_blank", None);
        }
        if Self::earliest_entry_date().is_some_and(|min| tx.entry_date < min) {
            Self::constraint(tx, "entry_date_present", None);
        }

        let mut seen = HashSet::new();
        if tx.items.iter().any(|i| !seen.insert(i.id.as_str())) {
            Self::constraint(tx, "item_ids_unique", None);
        }

        if tx.internal_number.trim().is_empty() {
            tx.add_violation(Violation::for_transaction(
                ViolationCode::TxInternalNumberMustBePresent,
                Self::NAME,
            ));
        }

        let mut item_findings = Vec::new();
        for item in tx.active_items() {
            if item.amount_fcy < Decimal::ZERO || item.amount_lcy < Decimal::ZERO {
                item_findings.push((item.id.clone(), Some("amount_non_negative")));
            }
            if item.fx_rate <= Decimal::ZERO {
                item_findings.push((item.id.clone(), Some("fx_rate_positive")));
            }
            if item.document.as_ref().is_some_and(|d| d.number.trim().is_empty()) {
                item_findings.push((item.id.clone(), None));
            }
        }

        for (item_id, constraint) in item_findings {
            match constraint {
                Some(name) => Self::constraint(tx, name, Some(&item_id)),
                None => tx.add_violation(Violation::for_item(
                    ViolationCode::DocumentNameMustBeSet,
                    &item_id,
                    Self::NAME,
                )),
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionTypeUnknown;

impl TaskItem for TransactionTypeUnknown {
    fn name(&self) -> &'static str {
        "TransactionTypeUnknown"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::Unknown {
            tx.add_violation(Violation::for_transaction(
                ViolationCode::TransactionTypeUnknown,
                self.name(),
            ));
        }
    }
}
