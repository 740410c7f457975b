//! Conversion task items
//!
//! Each one resolves customer codes to canonical master data. Every unresolved
//! reference yields its own violation; nothing aborts the run.

use std::sync::Arc;

use crate::organisation::OrganisationLookup;
use crate::pipeline::TaskItem;
use crate::types::{AccountEvent, Transaction, Violation, ViolationCode};

pub struct OrganisationConversion {
    lookup: Arc<dyn OrganisationLookup>,
}

impl OrganisationConversion {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for OrganisationConversion {
    fn name(&self) -> &'static str {
        "OrganisationConversion"
    }

    fn apply(&self, tx: &mut Transaction) {
        match self.lookup.find_organisation(tx.organisation_id()) {
            Some(organisation) => {
                tx.organisation.name = Some(organisation.name);
                tx.organisation.currency_id = Some(organisation.currency_id);
            }
            None => {
                let violation = Violation::for_transaction(ViolationCode::OrganisationDataNotFound, self.name())
                    .with_detail("organisationId", tx.organisation_id());
                tx.add_violation(violation);
            }
        }
    }
}

/// Resolves document currency and VAT codes
pub struct DocumentConversion {
    lookup: Arc<dyn OrganisationLookup>,
}

impl DocumentConversion {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for DocumentConversion {
    fn name(&self) -> &'static str {
        "DocumentConversion"
    }

    fn apply(&self, tx: &mut Transaction) {
        let organisation_id = tx.organisation.id.clone();
        let mut violations = Vec::new();

        for item in tx.active_items_mut() {
            let Some(document) = item.document.as_mut() else {
                continue;
            };

            match self.lookup.find_currency(&organisation_id, &document.currency.customer_code) {
                Some(currency_id) => document.currency.id = Some(currency_id),
                None => violations.push(
                    Violation::for_item(ViolationCode::CurrencyDataNotFound, &item.id, self.name())
                        .with_detail("customerCurrencyCode", document.currency.customer_code.as_str()),
                ),
            }

            if let Some(vat) = document.vat.as_mut() {
                match self.lookup.find_vat_rate(&organisation_id, &vat.customer_code) {
                    Some(rate) => vat.rate = Some(rate),
                    None => violations.push(
                        Violation::for_item(ViolationCode::VatDataNotFound, &item.id, self.name())
                            .with_detail("customerCode", vat.customer_code.as_str()),
                    ),
                }
            }
        }

        for violation in violations {
            tx.add_violation(violation);
        }
    }
}

pub struct CostCenterConversion {
    lookup: Arc<dyn OrganisationLookup>,
}

impl CostCenterConversion {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for CostCenterConversion {
    fn name(&self) -> &'static str {
        "CostCenterConversion"
    }

    fn apply(&self, tx: &mut Transaction) {
        let organisation_id = tx.organisation.id.clone();
        let mut violations = Vec::new();

        for item in tx.active_items_mut() {
            let Some(cost_center) = item.cost_center.as_mut() else {
                continue;
            };
            match self.lookup.find_cost_center(&organisation_id, &cost_center.customer_code) {
                Some(data) => {
                    cost_center.external_customer_code = Some(data.external_customer_code);
                    cost_center.name = Some(data.name);
                }
                None => violations.push(
                    Violation::for_item(ViolationCode::CostCenterDataNotFound, &item.id, self.name())
                        .with_detail("customerCode", cost_center.customer_code.as_str()),
                ),
            }
        }

        for violation in violations {
            tx.add_violation(violation);
        }
    }
}

pub struct ProjectConversion {
    lookup: Arc<dyn OrganisationLookup>,
}

impl ProjectConversion {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for ProjectConversion {
    fn name(&self) -> &'static str {
        "ProjectConversion"
    }

    fn apply(&self, tx: &mut Transaction) {
        let organisation_id = tx.organisation.id.clone();
        let mut violations = Vec::new();

        for item in tx.active_items_mut() {
            let Some(project) = item.project.as_mut() else {
                continue;
            };
            match self.lookup.find_project(&organisation_id, &project.customer_code) {
                Some(data) => {
                    project.external_customer_code = Some(data.external_customer_code);
                    project.name = Some(data.name);
                }
                None => violations.push(
                    Violation::for_item(ViolationCode::ProjectDataNotFound, &item.id, self.name())
                        .with_detail("customerCode", project.customer_code.as_str()),
                ),
            }
        }

        for violation in violations {
            tx.add_violation(violation);
        }
    }
}

/// Resolves chart-of-account references and the resulting event code
pub struct AccountEventCodesConversion {
    lookup: Arc<dyn OrganisationLookup>,
}

impl AccountEventCodesConversion {
    pub fn new(lookup: Arc<dyn OrganisationLookup>) -> Self {
        Self { lookup }
    }
}

impl TaskItem for AccountEventCodesConversion {
    fn name(&self) -> &'static str {
        "AccountEventCodesConversion"
    }

    fn apply(&self, tx: &mut Transaction) {
        let organisation_id = tx.organisation.id.clone();
        let mut violations = Vec::new();

        for item in tx.active_items_mut() {
            let item_id = item.id.clone();

            for (side, account) in [("DEBIT", item.account_debit.as_mut()), ("CREDIT", item.account_credit.as_mut())] {
                let Some(account) = account.filter(|a| !a.code.trim().is_empty()) else {
                    continue;
                };
                match self.lookup.find_chart_of_account(&organisation_id, &account.code) {
                    Some(chart) => {
                        account.ref_code = Some(chart.event_ref_code);
                        account.name = Some(chart.name);
                    }
                    None => {
                        account.ref_code = None;
                        account.name = None;
                        violations.push(
                            Violation::for_item(ViolationCode::ChartOfAccountNotFound, &item_id, self.name())
                                .with_sub_code(side)
                                .with_detail("accountCode", account.code.as_str()),
                        );
                    }
                }
            }

            let debit_ref = item.account_debit.as_ref().and_then(|a| a.ref_code.clone());
            let credit_ref = item.account_credit.as_ref().and_then(|a| a.ref_code.clone());
            let (Some(debit_ref), Some(credit_ref)) = (debit_ref, credit_ref) else {
                item.account_event = None;
                continue;
            };

            match self.lookup.find_account_event(&organisation_id, &debit_ref, &credit_ref) {
                Some(event) => {
                    item.account_event = Some(AccountEvent {
                        code: format!("{}{}", debit_ref, credit_ref),
                        name: event.name,
                    });
                }
                None => {
                    item.account_event = None;
                    violations.push(
                        Violation::for_item(ViolationCode::AccountEventDataNotFound, &item_id, self.name())
                            .with_detail("eventCode", format!("{}{}", debit_ref, credit_ref)),
                    );
                }
            }
        }

        for violation in violations {
            tx.add_violation(violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organisation::{ChartOfAccount, InMemoryOrganisationLookup, Organisation};
    use crate::types::{Document, OperationType, TransactionItem, TransactionType, Vat};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn create_test_lookup() -> Arc<dyn OrganisationLookup> {
        Arc::new(
            InMemoryOrganisationLookup::new()
                .with_organisation(Organisation {
                    id: "org-1".into(),
                    name: "Org One".into(),
                    currency_id: "ISO_4217:CHF".into(),
                    dummy_account: None,
                })
                .with_currency("org-1", "EUR", "ISO_4217:EUR")
                .with_chart_of_account(
                    "org-1",
                    "1000",
                    ChartOfAccount {
                        event_ref_code: "11".into(),
                        name: "Cash".into(),
                    },
                )
                .with_chart_of_account(
                    "org-1",
                    "2000",
                    ChartOfAccount {
                        event_ref_code: "22".into(),
                        name: "Payables".into(),
                    },
                )
                .with_account_event("org-1", "11", "22", "Payment"),
        )
    }

    fn create_test_transaction(item: TransactionItem) -> Transaction {
        Transaction::new(
            "org-1",
            "VB-7",
            TransactionType::VendorBill,
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
        )
        .with_item(item)
    }

    #[test]
    fn test_unresolved_references_yield_distinct_violations() {
        let mut document = Document::new("DOC-1", "XXX");
        document.vat = Some(Vat {
            customer_code: "V9".into(),
            rate: None,
        });
        let mut tx = create_test_transaction(
            TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE)
                .with_document(document)
                .with_cost_center("CC-404")
                .with_project("P-404"),
        );

        let lookup = create_test_lookup();
        DocumentConversion::new(lookup.clone()).apply(&mut tx);
        CostCenterConversion::new(lookup.clone()).apply(&mut tx);
        ProjectConversion::new(lookup).apply(&mut tx);

        let codes: Vec<_> = tx.violations.iter().map(|v| v.code).collect();
        assert_eq!(
            codes,
            vec![
                ViolationCode::CurrencyDataNotFound,
                ViolationCode::VatDataNotFound,
                ViolationCode::CostCenterDataNotFound,
                ViolationCode::ProjectDataNotFound,
            ]
        );
    }

    #[test]
    fn test_organisation_conversion() {
        let mut tx = create_test_transaction(TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE));
        OrganisationConversion::new(create_test_lookup()).apply(&mut tx);
        assert_eq!(tx.organisation.currency_id.as_deref(), Some("ISO_4217:CHF"));

        tx.organisation.id = "org-unknown".into();
        OrganisationConversion::new(create_test_lookup()).apply(&mut tx);
        assert!(tx.has_violation(ViolationCode::OrganisationDataNotFound));
    }

    #[test]
    fn test_account_event_resolution() {
        let mut tx = create_test_transaction(
            TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE)
                .with_debit("1000")
                .with_credit("2000"),
        );
        AccountEventCodesConversion::new(create_test_lookup()).apply(&mut tx);

        assert!(tx.violations.is_empty());
        let event = tx.items[0].account_event.as_ref().unwrap();
        assert_eq!(event.code, "1122");
        assert_eq!(event.name, "Payment");
    }

    #[test]
    fn test_chart_of_account_sides() {
        let mut tx = create_test_transaction(
            TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE)
                .with_debit("9999")
                .with_credit("8888"),
        );
        AccountEventCodesConversion::new(create_test_lookup()).apply(&mut tx);

        let sides: Vec<_> = tx.violations.iter().filter_map(|v| v.sub_code.as_deref()).collect();
        assert_eq!(sides, vec!["DEBIT", "CREDIT"]);
        assert!(!tx.has_violation(ViolationCode::AccountEventDataNotFound));
    }

    #[test]
    fn test_lost_chart_entry_clears_derived_codes() {
        let mut tx = create_test_transaction(
            TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE)
                .with_debit("1000")
                .with_credit("2000"),
        );
        AccountEventCodesConversion::new(create_test_lookup()).apply(&mut tx);
        assert!(tx.items[0].account_event.is_some());

        let shrunk: Arc<dyn OrganisationLookup> = Arc::new(InMemoryOrganisationLookup::new().with_chart_of_account(
            "org-1",
            "2000",
            ChartOfAccount {
                event_ref_code: "22".into(),
                name: "Payables".into(),
            },
        ));
        AccountEventCodesConversion::new(shrunk).apply(&mut tx);

        let item = &tx.items[0];
        let debit = item.account_debit.as_ref().unwrap();
        assert_eq!(debit.ref_code, None);
        assert_eq!(debit.name, None);
        assert_eq!(item.account_credit.as_ref().unwrap().ref_code.as_deref(), Some("22"));
        assert!(item.account_event.is_none());
        assert!(tx.has_violation(ViolationCode::ChartOfAccountNotFound));
    }
}
