//! Journal-specific task items built around the organisation dummy account

use std::sync::Arc;

use super::cleansing::sum_fcy;
use crate::organisation::OrganisationLookup;
use crate::pipeline::TaskItem;
use crate::types::{Account, OperationType, Transaction, TransactionType, Violation, ViolationCode};

pub(super) fn dummy_account(lookup: &dyn OrganisationLookup, tx: &Transaction) -> Option<String> {
    lookup
        .find_organisation(tx.organisation_id())
        .and_then(|o| o.dummy_account)
        .filter(|a| !a.trim().is_empty())
}

/// Fills the credit side of single-sided journals with the dummy account
pub struct JournalAccountCreditEnrichment {
    lookup: Arc<dyn OrganisationLookup>,
}

impl JournalAccountCreditEnrichment {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for JournalAccountCreditEnrichment {
    fn name(&self) -> &'static str {
        "JournalAccountCreditEnrichment"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type != TransactionType::Journal || !tx.is_publishable() {
            return;
        }
        if tx.active_items().any(|i| i.credit_code().is_some()) {
            return;
        }

        let Some(dummy) = dummy_account(self.lookup.as_ref(), tx) else {
            tx.add_violation(Violation::for_transaction(
                ViolationCode::JournalDummyAccountMissing,
                self.name(),
            ));
            return;
        };

        for item in tx.active_items_mut() {
            match item.operation_type {
                OperationType::Debit => item.account_credit = Some(Account::new(dummy.as_str())),
                OperationType::Credit => {
                    item.account_credit = item.account_debit.take();
                    item.account_debit = Some(Account::new(dummy.as_str()));
                    item.operation_type = OperationType::Debit;
                }
            }
        }
    }
}

/// Flags journals whose dummy-account legs cancel each other out
///
/// Every item debiting the dummy account must be matched by the FCY sum of
/// the non-dummy debits booked on its credit account.
pub struct NetOffDetection {
    lookup: Arc<dyn OrganisationLookup>,
}

impl NetOffDetection {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for NetOffDetection {
    fn name(&self) -> &'static str {
        "NetOffDetection"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type != TransactionType::Journal {
            return;
        }
        let Some(dummy) = dummy_account(self.lookup.as_ref(), tx) else {
            return;
        };

        let dummy_debits: Vec<_> = tx
            .active_items()
            .filter(|i| i.debit_code() == Some(dummy.as_str()))
            .collect();
        if dummy_debits.is_empty() {
            return;
        }

        let all_matched = dummy_debits.iter().all(|dummy_item| {
            let Some(counter_account) = dummy_item.credit_code() else {
                return false;
            };
            let matched = sum_fcy(tx.active_items().filter(|other| {
                other.debit_code().is_some_and(|d| d != dummy && d == counter_account)
            }));
            matched == dummy_item.amount_fcy
        });

        if all_matched {
            tx.add_violation(Violation::for_transaction(ViolationCode::NetOffTx, self.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organisation::{InMemoryOrganisationLookup, Organisation};
    use crate::types::TransactionItem;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    const DUMMY: &str = "0000000000";

    fn create_test_lookup(dummy: Option<&str>) -> Arc<dyn OrganisationLookup> {
        Arc::new(InMemoryOrganisationLookup::new().with_organisation(Organisation {
            id: "org-1".into(),
            name: "Org".into(),
            currency_id: "ISO_4217:EUR".into(),
            dummy_account: dummy.map(str::to_string),
        }))
    }

    fn create_test_journal(items: Vec<TransactionItem>) -> Transaction {
        let mut tx = Transaction::new(
            "org-1",
            "JE-1",
            TransactionType::Journal,
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        );
        for item in items {
            tx.push_item(item);
        }
        tx
    }

    fn hundred() -> Decimal {
        Decimal::new(100, 0)
    }

    #[test]
    fn test_enrichment_fills_dummy_credit() {
        let lookup = create_test_lookup(Some(DUMMY));
        let mut tx = create_test_journal(vec![
            TransactionItem::new("", OperationType::Debit, hundred(), hundred()).with_debit("1000"),
            TransactionItem::new("", OperationType::Credit, hundred(), hundred()).with_debit("2000"),
        ]);

        let enrichment = JournalAccountCreditEnrichment::new(lookup);
        enrichment.apply(&mut tx);
        let once = tx.clone();
        enrichment.apply(&mut tx);

        assert_eq!(once, tx);
        assert_eq!(tx.items[0].credit_code(), Some(DUMMY));
        assert_eq!(tx.items[1].debit_code(), Some(DUMMY));
        assert_eq!(tx.items[1].credit_code(), Some("2000"));
        assert_eq!(tx.items[1].operation_type, OperationType::Debit);
    }

    #[test]
    fn test_enrichment_without_dummy_account() {
        let mut tx = create_test_journal(vec![
            TransactionItem::new("", OperationType::Debit, hundred(), hundred()).with_debit("1000"),
        ]);
        JournalAccountCreditEnrichment::new(create_test_lookup(None)).apply(&mut tx);
        assert!(tx.has_violation(ViolationCode::JournalDummyAccountMissing));
    }

    #[test]
    fn test_net_off_detected_on_transaction() {
        let mut tx = create_test_journal(vec![
            TransactionItem::new("", OperationType::Debit, hundred(), hundred())
                .with_debit(DUMMY)
                .with_credit("Test1"),
            TransactionItem::new("", OperationType::Credit, hundred(), hundred())
                .with_debit("Test1")
                .with_credit(DUMMY),
        ]);

        NetOffDetection::new(create_test_lookup(Some(DUMMY))).apply(&mut tx);

        let net_offs: Vec<_> = tx.violations.iter().filter(|v| v.code == ViolationCode::NetOffTx).collect();
        assert_eq!(net_offs.len(), 1);
        assert!(net_offs[0].item_id.is_none());
    }

    #[test]
    fn test_no_net_off_without_dummy_debit() {
        let mut tx = create_test_journal(vec![
            TransactionItem::new("", OperationType::Debit, hundred(), hundred())
                .with_debit("1000")
                .with_credit("Test1"),
        ]);
        NetOffDetection::new(create_test_lookup(Some(DUMMY))).apply(&mut tx);
        assert!(tx.violations.is_empty());
    }

    #[test]
    fn test_no_net_off_when_amounts_differ() {
        let mut tx = create_test_journal(vec![
            TransactionItem::new("", OperationType::Debit, hundred(), hundred())
                .with_debit(DUMMY)
                .with_credit("Test1"),
            TransactionItem::new("", OperationType::Credit, Decimal::new(60, 0), Decimal::new(60, 0))
                .with_debit("Test1")
                .with_credit(DUMMY),
        ]);
        NetOffDetection::new(create_test_lookup(Some(DUMMY))).apply(&mut tx);
        assert!(!tx.has_violation(ViolationCode::NetOffTx));
    }
}
