//! Violation model
//!
//! Violations are data, never errors: they accumulate on a transaction while
//! the pipeline runs and drive its processing status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which system is responsible for fixing a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSource {
    /// ERP data must be corrected; transaction becomes INVALID
    Erp,
    /// Ledger-side data (master data, review) must be corrected; transaction becomes PENDING
    Lob,
}

/// Violation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    TxValidationError,
    TxInternalNumberMustBePresent,
    DocumentNameMustBeSet,
    TransactionTypeUnknown,
    AmountFcyIsZero,
    AmountLcyIsZero,
    LcyBalanceMustBeZero,
    FcyBalanceMustBeZero,
    JournalDummyAccountMissing,
    OrganisationDataNotFound,
    CurrencyDataNotFound,
    VatDataNotFound,
    CostCenterDataNotFound,
    ProjectDataNotFound,
    ChartOfAccountNotFound,
    AccountEventDataNotFound,
    AccountCodeDebitIsEmpty,
    AccountCodeCreditIsEmpty,
    DocumentMustBePresent,
    AllTxItemsErased,
    NetOffTx,
    TxCannotBeAltered,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TxValidationError => "TX_VALIDATION_ERROR",
            Self::TxInternalNumberMustBePresent => "TX_INTERNAL_NUMBER_MUST_BE_PRESENT",
            Self::DocumentNameMustBeSet => "DOCUMENT_NAME_MUST_BE_SET",
            Self::TransactionTypeUnknown => "TRANSACTION_TYPE_UNKNOWN",
            Self::AmountFcyIsZero => "AMOUNT_FCY_IS_ZERO",
            Self::AmountLcyIsZero => "AMOUNT_LCY_IS_ZERO",
            Self::LcyBalanceMustBeZero => "LCY_BALANCE_MUST_BE_ZERO",
            Self::FcyBalanceMustBeZero => "FCY_BALANCE_MUST_BE_ZERO",
            Self::JournalDummyAccountMissing => "JOURNAL_DUMMY_ACCOUNT_MISSING",
            Self::OrganisationDataNotFound => "ORGANISATION_DATA_NOT_FOUND",
            Self::CurrencyDataNotFound => "CURRENCY_DATA_NOT_FOUND",
            Self::VatDataNotFound => "VAT_DATA_NOT_FOUND",
            Self::CostCenterDataNotFound => "COST_CENTER_DATA_NOT_FOUND",
            Self::ProjectDataNotFound => "PROJECT_DATA_NOT_FOUND",
            Self::ChartOfAccountNotFound => "CHART_OF_ACCOUNT_NOT_FOUND",
            Self::AccountEventDataNotFound => "ACCOUNT_EVENT_DATA_NOT_FOUND",
            Self::AccountCodeDebitIsEmpty => "ACCOUNT_CODE_DEBIT_IS_EMPTY",
            Self::AccountCodeCreditIsEmpty => "ACCOUNT_CODE_CREDIT_IS_EMPTY",
            Self::DocumentMustBePresent => "DOCUMENT_MUST_BE_PRESENT",
            Self::AllTxItemsErased => "ALL_TX_ITEMS_ERASED",
            Self::NetOffTx => "NET_OFF_TX",
            Self::TxCannotBeAltered => "TX_CANNOT_BE_ALTERED",
        }
    }

    /// Default responsibility for a code
    pub fn default_source(&self) -> ViolationSource {
        match self {
            Self::JournalDummyAccountMissing
            | Self::OrganisationDataNotFound
            | Self::CurrencyDataNotFound
            | Self::VatDataNotFound
            | Self::CostCenterDataNotFound
            | Self::ProjectDataNotFound
            | Self::ChartOfAccountNotFound
            | Self::AccountEventDataNotFound
            | Self::TxCannotBeAltered => ViolationSource::Lob,
            _ => ViolationSource::Erp,
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule failure attached to a transaction, optionally keyed to one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: ViolationCode,
    /// Item the violation refers to; `None` means the whole transaction
    pub item_id: Option<String>,
    /// Distinguishes several violations of the same code on the same target
    pub sub_code: Option<String>,
    pub source: ViolationSource,
    /// Name of the task item that produced the violation
    pub processor_module: String,
    /// Free-form detail
    pub bag: BTreeMap<String, String>,
}

impl Violation {
    /// Transaction-level violation
    pub fn for_transaction(code: ViolationCode, processor_module: &str) -> Self {
        Self {
            code,
            item_id: None,
            sub_code: None,
            source: code.default_source(),
            processor_module: processor_module.to_string(),
            bag: BTreeMap::new(),
        }
    }

    /// Item-level violation
    pub fn for_item(code: ViolationCode, item_id: &str, processor_module: &str) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            ..Self::for_transaction(code, processor_module)
        }
    }

    pub fn with_sub_code(mut self, sub_code: impl Into<String>) -> Self {
        self.sub_code = Some(sub_code.into());
        self
    }

    pub fn with_source(mut self, source: ViolationSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.bag.insert(key.to_string(), value.into());
        self
    }

    /// Identity used for de-duplication
    pub fn key(&self) -> (ViolationCode, Option<&str>, Option<&str>) {
        (self.code, self.item_id.as_deref(), self.sub_code.as_deref())
    }
}
