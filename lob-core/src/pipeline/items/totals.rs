//! Transaction totals

use rust_decimal::Decimal;
use std::sync::Arc;

use super::journal::dummy_account;
use crate::organisation::OrganisationLookup;
use crate::pipeline::TaskItem;
use crate::types::{Transaction, TransactionType};

/// Stores the LCY total of a clean transaction
///
/// Journals count only the legs debiting the dummy account; FX revaluations
/// count the net of both sides. Cleared while the transaction has violations.
pub struct TxTotalAmountSumm {
    lookup: Arc<dyn OrganisationLookup>,
}

impl TxTotalAmountSumm {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }

    fn total_lcy(&self, tx: &Transaction) -> Decimal {
        match tx.transaction_type {
            TransactionType::Journal => {
                let Some(dummy) = dummy_account(self.lookup.as_ref(), tx) else {
                    return Decimal::ZERO;
                };
                tx.active_items()
                    .filter(|i| i.debit_code() == Some(dummy.as_str()))
                    .map(|i| i.amount_lcy)
                    .sum::<Decimal>()
                    .abs()
            }
            TransactionType::FxRevaluation => tx.active_items().map(|i| i.signed_lcy()).sum::<Decimal>().abs(),
            _ => tx.active_items().map(|i| i.amount_lcy).sum::<Decimal>().abs(),
        }
    }
}

impl TaskItem for TxTotalAmountSumm {
    fn name(&self) -> &'static str {
        "TxTotalAmountSumm"
    }

    fn apply(&self, tx: &mut Transaction) {
        tx.total_amount_lcy = if tx.has_violations() {
            None
        } else {
            Some(self.total_lcy(tx))
        };
    }
}
