//! Cleansing task items: they discard or merge items, never add violations

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::pipeline::TaskItem;
use crate::types::{ItemStatus, OperationType, Transaction, TransactionItem, TransactionType};

/// Marks items with zero FCY and zero LCY as erased
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardZeroBalance;

impl TaskItem for DiscardZeroBalance {
    fn name(&self) -> &'static str {
        "DiscardZeroBalance"
    }

    fn apply(&self, tx: &mut Transaction) {
        let mut erased = Vec::new();
        for item in tx.active_items_mut() {
            if item.amount_fcy.is_zero() && item.amount_lcy.is_zero() {
                item.status = ItemStatus::ErasedZeroBalance;
                erased.push(item.id.clone());
            }
        }
        for item_id in erased {
            tx.remove_item_violations(&item_id);
        }
    }
}

/// Removes items that debit and credit the same account
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSameAccount;

impl TaskItem for DiscardSameAccount {
    fn name(&self) -> &'static str {
        "DiscardSameAccount"
    }

    fn apply(&self, tx: &mut Transaction) {
        let self_payments: Vec<String> = tx
            .active_items()
            .filter(|i| matches!((i.debit_code(), i.credit_code()), (Some(d), Some(c)) if d == c))
            .map(|i| i.id.clone())
            .collect();

        for item_id in self_payments {
            tx.remove_item(&item_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SummingKey {
    operation_type: OperationType,
    debit: Option<String>,
    credit: Option<String>,
    event: Option<String>,
    document: Option<String>,
    currency: Option<String>,
    vat: Option<String>,
    counterparty: Option<String>,
    cost_center: Option<String>,
    project: Option<String>,
}

impl SummingKey {
    fn of(item: &TransactionItem) -> Self {
        let document = item.document.as_ref();
        Self {
            operation_type: item.operation_type,
            debit: item.debit_code().map(str::to_string),
            credit: item.credit_code().map(str::to_string),
            event: item.account_event.as_ref().map(|e| e.code.clone()),
            document: document.map(|d| d.number.clone()),
            currency: document.map(|d| d.currency.customer_code.clone()),
            vat: document.and_then(|d| d.vat.as_ref()).map(|v| v.customer_code.clone()),
            counterparty: document
                .and_then(|d| d.counterparty.as_ref())
                .map(|c| c.customer_code.clone()),
            cost_center: item.cost_center.as_ref().map(|c| c.customer_code.clone()),
            project: item.project.as_ref().map(|p| p.customer_code.clone()),
        }
    }
}

/// Collapses items that book the same thing into the first of them
#[derive(Debug, Default, Clone, Copy)]
pub struct TxItemsAmountsSumming;

impl TaskItem for TxItemsAmountsSumming {
    fn name(&self) -> &'static str {
        "TxItemsAmountsSumming"
    }

    fn apply(&self, tx: &mut Transaction) {
        let mut first_by_key: HashMap<SummingKey, usize> = HashMap::new();
        // (survivor index, merged index)
        let mut merges: Vec<(usize, usize)> = Vec::new();

        for (index, item) in tx.items.iter().enumerate() {
            if !item.is_active() {
                continue;
            }
            match first_by_key.get(&SummingKey::of(item)) {
                Some(&survivor) => merges.push((survivor, index)),
                None => {
                    first_by_key.insert(SummingKey::of(item), index);
                }
            }
        }

        let mut erased = Vec::with_capacity(merges.len());
        for (survivor, merged) in merges {
            let (fcy, lcy) = {
                let item = &mut tx.items[merged];
                item.status = ItemStatus::ErasedSumApplied;
                erased.push(item.id.clone());
                (item.amount_fcy, item.amount_lcy)
            };
            let target = &mut tx.items[survivor];
            target.amount_fcy += fcy;
            target.amount_lcy += lcy;
        }

        for item_id in erased {
            tx.remove_item_violations(&item_id);
        }
    }
}

/// FX revaluations only move LCY; their FCY mirrors it
#[derive(Debug, Default, Clone, Copy)]
pub struct FxRevaluationCopyLcyToFcy;

impl TaskItem for FxRevaluationCopyLcyToFcy {
    fn name(&self) -> &'static str {
        "FxRevaluationCopyLcyToFcy"
    }

    fn apply(&self, tx: &mut Transaction) {
        if tx.transaction_type != TransactionType::FxRevaluation {
            return;
        }
        for item in tx.active_items_mut() {
            item.amount_fcy = item.amount_lcy;
        }
    }
}

/// Sum of active FCY amounts, used by checks that need totals
pub(crate) fn sum_fcy<'a>(items: impl Iterator<Item = &'a TransactionItem>) -> Decimal {
    items.map(|i| i.amount_fcy).sum()
}
