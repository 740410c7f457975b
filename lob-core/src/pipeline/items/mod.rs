//! Task items

mod cleansing;
mod conversion;
mod journal;
mod sanity;
mod totals;
mod validation;

pub use cleansing::{DiscardSameAccount, DiscardZeroBalance, FxRevaluationCopyLcyToFcy, TxItemsAmountsSumming};
pub use conversion::{
    AccountEventCodesConversion, CostCenterConversion, DocumentConversion, OrganisationConversion,
    ProjectConversion,
};
pub use journal::{JournalAccountCreditEnrichment, NetOffDetection};
pub use sanity::{SanityCheckFields, TransactionTypeUnknown};
pub use totals::TxTotalAmountSumm;
pub use validation::{
    AccountCodeCreditCheck, AccountCodeDebitCheck, AmountsFcyBalanceZerosOut, AmountsFcyCheck,
    AmountsLcyBalanceZerosOut, AmountsLcyCheck, CheckIfAllTxItemsAreErased, DocumentMustBePresent,
};
