//! Organisation master-data lookup
//!
//! Reference data (currencies, VAT codes, cost centers, projects, chart of
//! accounts, event codes) is owned by another service. The pipeline only reads
//! it through `OrganisationLookup`, which reports unknown codes as `None`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::OrganisationId;

/// Organisation master record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: OrganisationId,
    pub name: String,
    pub currency_id: String,
    /// Suspense account used to balance single-sided journals
    pub dummy_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenterData {
    pub external_customer_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub external_customer_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccount {
    pub event_ref_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEventData {
    pub name: String,
}

/// Read-only master-data access used by the conversion task items
pub trait OrganisationLookup: Send + Sync {
    fn find_organisation(&self, organisation_id: &str) -> Option<Organisation>;

    fn find_currency(&self, organisation_id: &str, customer_code: &str) -> Option<String>;

    fn find_vat_rate(&self, organisation_id: &str, customer_code: &str) -> Option<Decimal>;

    fn find_cost_center(&self, organisation_id: &str, customer_code: &str) -> Option<CostCenterData>;

    fn find_project(&self, organisation_id: &str, customer_code: &str) -> Option<ProjectData>;

    fn find_chart_of_account(&self, organisation_id: &str, account_code: &str) -> Option<ChartOfAccount>;

    fn find_account_event(
        &self,
        organisation_id: &str,
        debit_ref_code: &str,
        credit_ref_code: &str,
    ) -> Option<AccountEventData>;

    /// All organisations known to the master-data service
    fn organisation_ids(&self) -> Vec<OrganisationId>;
}

type Scoped<T> = HashMap<(OrganisationId, String), T>;

/// In-memory master data, assembled with the `with_*` builders
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrganisationLookup {
    organisations: HashMap<OrganisationId, Organisation>,
    currencies: Scoped<String>,
    vat_rates: Scoped<Decimal>,
    cost_centers: Scoped<CostCenterData>,
    projects: Scoped<ProjectData>,
    chart_of_accounts: Scoped<ChartOfAccount>,
    account_events: Scoped<AccountEventData>,
}

impl InMemoryOrganisationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(organisation_id: &str, code: &str) -> (OrganisationId, String) {
        (organisation_id.to_string(), code.to_string())
    }

    pub fn with_organisation(mut self, organisation: Organisation) -> Self {
        self.organisations.insert(organisation.id.clone(), organisation);
        self
    }

    pub fn with_currency(mut self, organisation_id: &str, customer_code: &str, currency_id: &str) -> Self {
        self.currencies
            .insert(Self::key(organisation_id, customer_code), currency_id.to_string());
        self
    }

    pub fn with_vat(mut self, organisation_id: &str, customer_code: &str, rate: Decimal) -> Self {
        self.vat_rates.insert(Self::key(organisation_id, customer_code), rate);
        self
    }

    pub fn with_cost_center(mut self, organisation_id: &str, customer_code: &str, data: CostCenterData) -> Self {
        self.cost_centers.insert(Self::key(organisation_id, customer_code), data);
        self
    }

    pub fn with_project(mut self, organisation_id: &str, customer_code: &str, data: ProjectData) -> Self {
        self.projects.insert(Self::key(organisation_id, customer_code), data);
        self
    }

    pub fn with_chart_of_account(mut self, organisation_id: &str, account_code: &str, data: ChartOfAccount) -> Self {
        self.chart_of_accounts
            .insert(Self::key(organisation_id, account_code), data);
        self
    }

    pub fn with_account_event(
        mut self,
        organisation_id: &str,
        debit_ref_code: &str,
        credit_ref_code: &str,
        name: &str,
    ) -> Self {
        self.account_events.insert(
            Self::key(organisation_id, &format!("{}{}", debit_ref_code, credit_ref_code)),
            AccountEventData { name: name.to_string() },
        );
        self
    }
}

impl OrganisationLookup for InMemoryOrganisationLookup {
    fn find_organisation(&self, organisation_id: &str) -> Option<Organisation> {
        self.organisations.get(organisation_id).cloned()
    }

    fn find_currency(&self, organisation_id: &str, customer_code: &str) -> Option<String> {
        self.currencies.get(&Self::key(organisation_id, customer_code)).cloned()
    }

    fn find_vat_rate(&self, organisation_id: &str, customer_code: &str) -> Option<Decimal> {
        self.vat_rates.get(&Self::key(organisation_id, customer_code)).copied()
    }

    fn find_cost_center(&self, organisation_id: &str, customer_code: &str) -> Option<CostCenterData> {
        self.cost_centers.get(&Self::key(organisation_id, customer_code)).cloned()
    }

    fn find_project(&self, organisation_id: &str, customer_code: &str) -> Option<ProjectData> {
        self.projects.get(&Self::key(organisation_id, customer_code)).cloned()
    }

    fn find_chart_of_account(&self, organisation_id: &str, account_code: &str) -> Option<ChartOfAccount> {
        self.chart_of_accounts
            .get(&Self::key(organisation_id, account_code))
            .cloned()
    }

    fn find_account_event(
        &self,
        organisation_id: &str,
        debit_ref_code: &str,
        credit_ref_code: &str,
    ) -> Option<AccountEventData> {
        let code = format!("{}{}", debit_ref_code, credit_ref_code);
        self.account_events.get(&Self::key(organisation_id, &code)).cloned()
    }

    fn organisation_ids(&self) -> Vec<OrganisationId> {
        let mut ids: Vec<_> = self.organisations.keys().cloned().collect();
        ids.sort();
        ids
    }
}
