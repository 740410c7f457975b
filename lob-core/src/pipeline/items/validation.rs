//! Amount, balance and account-presence checks

use rust_decimal::Decimal;

use crate::pipeline::TaskItem;
use crate::types::{Transaction, TransactionType, Violation, ViolationCode};

fn add_item_violations(tx: &mut Transaction, code: ViolationCode, module: &str, item_ids: Vec<String>) {
    for item_id in item_ids {
        tx.add_violation(Violation::for_item(code, &item_id, module));
    }
}

/// FCY amount zero while LCY is not
#[derive(Debug, Default, Clone, Copy)]
pub struct AmountsFcyCheck;

impl TaskItem for AmountsFcyCheck {
    fn name(&self) -> &'static str {
        "AmountsFcyCheck"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::FxRevaluation {
            return;
        }
        let ids = tx
            .active_items()
            .filter(|i| i.amount_fcy.is_zero() && !i.amount_lcy.is_zero())
            .map(|i| i.id.clone())
            .collect();
        add_item_violations(tx, ViolationCode::AmountFcyIsZero, self.name(), ids);
    }
}

/// LCY amount zero while FCY is not
#[derive(Debug, Default, Clone, Copy)]
pub struct AmountsLcyCheck;

impl TaskItem for AmountsLcyCheck {
    fn name(&self) -> &'static str {
        "AmountsLcyCheck"
    }

    fn apply(&self, tx: &mut Transaction) {
        let ids = tx
            .active_items()
            .filter(|i| i.amount_lcy.is_zero() && !i.amount_fcy.is_zero())
            .map(|i| i.id.clone())
            .collect();
        add_item_violations(tx, ViolationCode::AmountLcyIsZero, self.name(), ids);
    }
}

/// Signed LCY amounts must sum to zero
#[derive(Debug, Default, Clone, Copy)]
pub struct AmountsLcyBalanceZerosOut;

impl TaskItem for AmountsLcyBalanceZerosOut {
    fn name(&self) -> &'static str {
        "AmountsLcyBalanceZerosOut"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::FxRevaluation {
            return;
        }
        let balance: Decimal = tx.active_items().map(|i| i.signed_lcy()).sum();
        if !balance.is_zero() {
            tx.add_violation(
                Violation::for_transaction(ViolationCode::LcyBalanceMustBeZero, self.name())
                    .with_detail("balance", balance.to_string()),
            );
        }
    }
}

/// Signed FCY amounts must sum to zero
#[derive(Debug, Default, Clone, Copy)]
pub struct AmountsFcyBalanceZerosOut;

impl TaskItem for AmountsFcyBalanceZerosOut {
    fn name(&self) -> &'static str {
        "AmountsFcyBalanceZerosOut"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::FxRevaluation {
            return;
        }
        let balance: Decimal = tx.active_items().map(|i| i.signed_fcy()).sum();
        if !balance.is_zero() {
            tx.add_violation(
                Violation::for_transaction(ViolationCode::FcyBalanceMustBeZero, self.name())
                    .with_detail("balance", balance.to_string()),
            );
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccountCodeDebitCheck;

impl TaskItem for AccountCodeDebitCheck {
    fn name(&self) -> &'static str {
        "AccountCodeDebitCheck"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::FxRevaluation {
            return;
        }
        let ids = tx
            .active_items()
            .filter(|i| i.debit_code().is_none())
            .map(|i| i.id.clone())
            .collect();
        add_item_violations(tx, ViolationCode::AccountCodeDebitIsEmpty, self.name(), ids);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccountCodeCreditCheck;

impl TaskItem for AccountCodeCreditCheck {
    fn name(&self) -> &'static str {
        "AccountCodeCreditCheck"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type == TransactionType::FxRevaluation {
            return;
        }
        let ids = tx
            .active_items()
            .filter(|i| i.credit_code().is_none())
            .map(|i| i.id.clone())
            .collect();
        add_item_violations(tx, ViolationCode::AccountCodeCreditIsEmpty, self.name(), ids);
    }
}

/// Every item needs a document, except for journals and revaluations
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentMustBePresent;

impl TaskItem for DocumentMustBePresent {
    fn name(&self) -> &'static str {
        "DocumentMustBePresent"
    }

    fn apply(&self, tx: &mut Transaction) {
        if matches!(
            tx.transaction_type,
            TransactionType::Journal | TransactionType::FxRevaluation
        ) {
            return;
        }
        let ids = tx
            .active_items()
            .filter(|i| i.document.is_none())
            .map(|i| i.id.clone())
            .collect();
        add_item_violations(tx, ViolationCode::DocumentMustBePresent, self.name(), ids);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CheckIfAllTxItemsAreErased;

impl TaskItem for CheckIfAllTxItemsAreErased {
    fn name(&self) -> &'static str {
        "CheckIfAllTxItemsAreErased"
    }

    fn apply(&self, tx: &mut Transaction) {
        if !tx.is_publishable() {
            tx.add_violation(Violation::for_transaction(ViolationCode::AllTxItemsErased, self.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemStatus, OperationType, TransactionItem};
    use chrono::NaiveDate;

    fn create_test_transaction(tx_type: TransactionType, items: Vec<TransactionItem>) -> Transaction {
        let mut tx = Transaction::new("org-1", "TX-9", tx_type, NaiveDate::from_ymd_opt(2024, 4, 4).unwrap());
        for item in items {
            tx.push_item(item);
        }
        tx
    }

    #[test]
    fn test_amount_checks() {
        let mut tx = create_test_transaction(
            TransactionType::VendorBill,
            vec![
                TransactionItem::new("", OperationType::Debit, Decimal::ZERO, Decimal::new(3, 0)),
                TransactionItem::new("", OperationType::Credit, Decimal::new(3, 0), Decimal::ZERO),
            ],
        );
        AmountsFcyCheck.apply(&mut tx);
        AmountsLcyCheck.apply(&mut tx);

        assert_eq!(tx.violations.len(), 2);
        assert_eq!(tx.violations[0].item_id.as_deref(), Some(tx.items[0].id.as_str()));
        assert_eq!(tx.violations[1].code, ViolationCode::AmountLcyIsZero);
    }

    #[test]
    fn test_balance_checks() {
        let mut tx = create_test_transaction(
            TransactionType::Journal,
            vec![
                TransactionItem::new("", OperationType::Debit, Decimal::new(10, 0), Decimal::new(10, 0)),
                TransactionItem::new("", OperationType::Credit, Decimal::new(10, 0), Decimal::new(9, 0)),
            ],
        );
        AmountsLcyBalanceZerosOut.apply(&mut tx);
        AmountsFcyBalanceZerosOut.apply(&mut tx);

        assert!(tx.has_violation(ViolationCode::LcyBalanceMustBeZero));
        assert!(!tx.has_violation(ViolationCode::FcyBalanceMustBeZero));

        tx.transaction_type = TransactionType::FxRevaluation;
        tx.violations.clear();
        AmountsLcyBalanceZerosOut.apply(&mut tx);
        assert!(tx.violations.is_empty());
    }

    #[test]
    fn test_account_and_document_presence() {
        let mut tx = create_test_transaction(
            TransactionType::CardCharge,
            vec![TransactionItem::new("", OperationType::Debit, Decimal::ONE, Decimal::ONE).with_debit("1000")],
        );
        AccountCodeDebitCheck.apply(&mut tx);
        AccountCodeCreditCheck.apply(&mut tx);
        DocumentMustBePresent.apply(&mut tx);

        assert!(!tx.has_violation(ViolationCode::AccountCodeDebitIsEmpty));
        assert!(tx.has_violation(ViolationCode::AccountCodeCreditIsEmpty));
        assert!(tx.has_violation(ViolationCode::DocumentMustBePresent));
    }

    #[test]
    fn test_all_items_erased() {
        let mut tx = create_test_transaction(
            TransactionType::CardCharge,
            vec![TransactionItem::new("", OperationType::Debit, Decimal::ZERO, Decimal::ZERO)],
        );
        CheckIfAllTxItemsAreErased.apply(&mut tx);
        assert!(!tx.has_violation(ViolationCode::AllTxItemsErased));

        tx.items[0].status = ItemStatus::ErasedZeroBalance;
        CheckIfAllTxItemsAreErased.apply(&mut tx);
        assert!(tx.has_violation(ViolationCode::AllTxItemsErased));
    }
}
