//! Transaction aggregate
//!
//! A `Transaction` is one ERP business event made of debit/credit lines
//! (`TransactionItem`). The pipeline mutates it in place; every reference that
//! may be missing is an `Option` so conversion code has to handle both branches.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::common::{digest_hex, AccountingPeriod, OrganisationId};
use super::status::{LedgerDispatchStatus, TransactionProcessingStatus};
use super::violation::{Violation, ViolationCode, ViolationSource};

/// ERP transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    CardCharge,
    VendorBill,
    CardRefund,
    Journal,
    FxRevaluation,
    Transfer,
    CustomerPayment,
    ExpenseReport,
    VendorPayment,
    BillCredit,
    CustomerInvoice,
    Unknown,
}

impl TransactionType {
    /// Parse the ERP name, falling back to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "CardCharge" => Self::CardCharge,
            "VendorBill" => Self::VendorBill,
            "CardRefund" => Self::CardRefund,
            "Journal" => Self::Journal,
            "FxRevaluation" => Self::FxRevaluation,
            "Transfer" => Self::Transfer,
            "CustomerPayment" => Self::CustomerPayment,
            "ExpenseReport" => Self::ExpenseReport,
            "VendorPayment" => Self::VendorPayment,
            "BillCredit" => Self::BillCredit,
            "CustomerInvoice" => Self::CustomerInvoice,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardCharge => "CardCharge",
            Self::VendorBill => "VendorBill",
            Self::CardRefund => "CardRefund",
            Self::Journal => "Journal",
            Self::FxRevaluation => "FxRevaluation",
            Self::Transfer => "Transfer",
            Self::CustomerPayment => "CustomerPayment",
            Self::ExpenseReport => "ExpenseReport",
            Self::VendorPayment => "VendorPayment",
            Self::BillCredit => "BillCredit",
            Self::CustomerInvoice => "CustomerInvoice",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Debit,
    Credit,
}

/// Validation status of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Ok,
    ErasedZeroBalance,
    ErasedSumApplied,
}

impl ItemStatus {
    pub fn is_erased(&self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// Ledger account on one side of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    /// Event reference code from the chart of accounts
    pub ref_code: Option<String>,
    pub name: Option<String>,
}

impl Account {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ref_code: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub customer_code: String,
    /// Canonical currency id, set by conversion
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vat {
    pub customer_code: String,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub customer_code: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub number: String,
    pub currency: Currency,
    pub vat: Option<Vat>,
    pub counterparty: Option<Counterparty>,
}

impl Document {
    pub fn new(number: impl Into<String>, currency_code: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            currency: Currency {
                customer_code: currency_code.into(),
                id: None,
            },
            vat: None,
            counterparty: None,
        }
    }
}

/// Cost center or project reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCode {
    pub customer_code: String,
    pub external_customer_code: Option<String>,
    pub name: Option<String>,
}

impl ReferenceCode {
    pub fn new(customer_code: impl Into<String>) -> Self {
        Self {
            customer_code: customer_code.into(),
            external_customer_code: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub code: String,
    pub name: String,
}

/// Organisation snapshot carried by the transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationRef {
    pub id: OrganisationId,
    pub name: Option<String>,
    pub currency_id: Option<String>,
}

/// One debit/credit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: String,
    pub operation_type: OperationType,
    pub amount_fcy: Decimal,
    pub amount_lcy: Decimal,
    pub fx_rate: Decimal,
    pub account_debit: Option<Account>,
    pub account_credit: Option<Account>,
    pub account_event: Option<AccountEvent>,
    pub cost_center: Option<ReferenceCode>,
    pub project: Option<ReferenceCode>,
    pub document: Option<Document>,
    #[serde(default)]
    pub status: ItemStatus,
}

impl TransactionItem {
    /// Item id derived from the owning transaction id and line sequence
    pub fn id_for(transaction_id: &str, sequence: usize) -> String {
        digest_hex(&[transaction_id, sequence.to_string().as_str()])
    }

    pub fn new(
        id: impl Into<String>,
        operation_type: OperationType,
        amount_fcy: Decimal,
        amount_lcy: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            operation_type,
            amount_fcy,
            amount_lcy,
            fx_rate: Decimal::ONE,
            account_debit: None,
            account_credit: None,
            account_event: None,
            cost_center: None,
            project: None,
            document: None,
            status: ItemStatus::Ok,
        }
    }

    pub fn with_debit(mut self, code: &str) -> Self {
        self.account_debit = Some(Account::new(code));
        self
    }

    pub fn with_credit(mut self, code: &str) -> Self {
        self.account_credit = Some(Account::new(code));
        self
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_cost_center(mut self, code: &str) -> Self {
        self.cost_center = Some(ReferenceCode::new(code));
        self
    }

    pub fn with_project(mut self, code: &str) -> Self {
        self.project = Some(ReferenceCode::new(code));
        self
    }

    pub fn with_fx_rate(mut self, fx_rate: Decimal) -> Self {
        self.fx_rate = fx_rate;
        self
    }

    pub fn debit_code(&self) -> Option<&str> {
        self.account_debit.as_ref().map(|a| a.code.as_str()).filter(|c| !c.trim().is_empty())
    }

    pub fn credit_code(&self) -> Option<&str> {
        self.account_credit.as_ref().map(|a| a.code.as_str()).filter(|c| !c.trim().is_empty())
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_erased()
    }

    fn signed(&self, amount: Decimal) -> Decimal {
        match self.operation_type {
            OperationType::Debit => amount,
            OperationType::Credit => -amount,
        }
    }

    pub fn signed_fcy(&self) -> Decimal {
        self.signed(self.amount_fcy)
    }

    pub fn signed_lcy(&self) -> Decimal {
        self.signed(self.amount_lcy)
    }
}

/// One ERP business event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub internal_number: String,
    pub transaction_type: TransactionType,
    pub entry_date: NaiveDate,
    pub accounting_period: AccountingPeriod,
    pub organisation: OrganisationRef,
    pub items: Vec<TransactionItem>,
    pub violations: Vec<Violation>,
    /// Total LCY amount, `None` until computed by a clean pipeline run
    #[serde(default)]
    pub total_amount_lcy: Option<Decimal>,
    /// `None` while the transaction has not been through a pipeline yet
    pub processing_status: Option<TransactionProcessingStatus>,
    #[serde(default)]
    pub ledger_dispatch_status: LedgerDispatchStatus,
    #[serde(default)]
    pub ledger_dispatch_approved: bool,
    /// Digest of the ERP-sourced content at ingestion time
    pub erp_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Deterministic transaction id
    pub fn id_for(organisation_id: &str, internal_number: &str) -> String {
        digest_hex(&[organisation_id, internal_number])
    }

    pub fn new(
        organisation_id: &str,
        internal_number: &str,
        transaction_type: TransactionType,
        entry_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(organisation_id, internal_number),
            internal_number: internal_number.to_string(),
            transaction_type,
            entry_date,
            accounting_period: AccountingPeriod::of(entry_date),
            organisation: OrganisationRef {
                id: organisation_id.to_string(),
                name: None,
                currency_id: None,
            },
            items: Vec::new(),
            violations: Vec::new(),
            total_amount_lcy: None,
            processing_status: None,
            ledger_dispatch_status: LedgerDispatchStatus::NotDispatched,
            ledger_dispatch_approved: false,
            erp_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an item, assigning the next sequence-derived id
    pub fn push_item(&mut self, mut item: TransactionItem) -> &mut Self {
        item.id = TransactionItem::id_for(&self.id, self.items.len());
        self.items.push(item);
        self
    }

    pub fn with_item(mut self, item: TransactionItem) -> Self {
        self.push_item(item);
        self
    }

    pub fn organisation_id(&self) -> &str {
        &self.organisation.id
    }

    pub fn active_items(&self) -> impl Iterator<Item = &TransactionItem> {
        self.items.iter().filter(|i| i.is_active())
    }

    pub fn active_items_mut(&mut self) -> impl Iterator<Item = &mut TransactionItem> {
        self.items.iter_mut().filter(|i| i.is_active())
    }

    pub fn item(&self, item_id: &str) -> Option<&TransactionItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// A transaction with zero surviving items cannot be published
    pub fn is_publishable(&self) -> bool {
        self.active_items().next().is_some()
    }

    /// Add a violation, replacing any existing one with the same identity
    pub fn add_violation(&mut self, violation: Violation) {
        if let Some(existing) = self.violations.iter_mut().find(|v| v.key() == violation.key()) {
            *existing = violation;
        } else {
            self.violations.push(violation);
        }
    }

    pub fn remove_item_violations(&mut self, item_id: &str) {
        self.violations.retain(|v| v.item_id.as_deref() != Some(item_id));
    }

    /// Remove an item and every violation that references it
    pub fn remove_item(&mut self, item_id: &str) {
        self.items.retain(|i| i.id != item_id);
        self.remove_item_violations(item_id);
    }

    pub fn clear_violations_from(&mut self, modules: &[&str]) {
        self.violations.retain(|v| !modules.contains(&v.processor_module.as_str()));
    }

    pub fn has_violation(&self, code: ViolationCode) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn has_erp_violations(&self) -> bool {
        self.violations.iter().any(|v| v.source == ViolationSource::Erp)
    }

    /// Re-derive the processing status from violations and dispatch state
    pub fn refresh_processing_status(&mut self) {
        let status = if self.ledger_dispatch_status.is_confirmed() {
            TransactionProcessingStatus::Dispatched
        } else if self.ledger_dispatch_status.is_on_chain() {
            TransactionProcessingStatus::Published
        } else if self.ledger_dispatch_approved {
            TransactionProcessingStatus::Publish
        } else if self.has_erp_violations() {
            TransactionProcessingStatus::Invalid
        } else if self.has_violations() {
            TransactionProcessingStatus::Pending
        } else {
            TransactionProcessingStatus::Approve
        };
        self.processing_status = Some(status);
        self.updated_at = Utc::now();
    }

    /// Digest over the ERP-sourced content of this transaction
    ///
    /// Only raw fields take part, so the value is stable across pipeline runs
    /// as long as it is computed before enrichment.
    pub fn compute_erp_version(&self) -> String {
        fn opt(s: Option<&str>) -> &str {
            s.unwrap_or("")
        }

        let mut parts: Vec<String> = vec![
            self.id.clone(),
            self.internal_number.clone(),
            self.transaction_type.as_str().to_string(),
            self.entry_date.to_string(),
            self.organisation.id.clone(),
        ];

        let mut items: Vec<&TransactionItem> = self.items.iter().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        for item in items {
            let document = item.document.as_ref();
            parts.push(
                [
                    item.id.as_str(),
                    match item.operation_type {
                        OperationType::Debit => "D",
                        OperationType::Credit => "C",
                    },
                    item.amount_fcy.normalize().to_string().as_str(),
                    item.amount_lcy.normalize().to_string().as_str(),
                    item.fx_rate.normalize().to_string().as_str(),
                    opt(item.account_debit.as_ref().map(|a| a.code.as_str())),
                    opt(item.account_credit.as_ref().map(|a| a.code.as_str())),
                    opt(document.map(|d| d.number.as_str())),
                    opt(document.map(|d| d.currency.customer_code.as_str())),
                    opt(document.and_then(|d| d.vat.as_ref()).map(|v| v.customer_code.as_str())),
                    opt(document
                        .and_then(|d| d.counterparty.as_ref())
                        .map(|c| c.customer_code.as_str())),
                    opt(item.cost_center.as_ref().map(|c| c.customer_code.as_str())),
                    opt(item.project.as_ref().map(|p| p.customer_code.as_str())),
                ]
                .join("|"),
            );
        }

        digest_hex(&parts)
    }
}
