//! In-memory configuration collaborators: status catalog, workflow levels
//! and item selling prices. Used in tests/dev and seeded by the caller.

use std::collections::HashMap;
use std::sync::RwLock;

use depotflow_core::{CompanyId, ItemId, StatusId};
use depotflow_inventory::SellingPriceLookup;
use depotflow_workflow::{Process, StatusCatalog, StatusCategory, WorkflowConfig, WorkflowResolver};

#[derive(Debug, Default)]
pub struct InMemoryStatusCatalog {
    entries: RwLock<HashMap<(CompanyId, Process, StatusCategory), StatusId>>,
}

impl InMemoryStatusCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, company_id: CompanyId, process: Process, category: StatusCategory) -> StatusId {
        let id = StatusId::new();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((company_id, process, category), id);
        }
        id
    }

    /// Register every category both processes need for `company_id`.
    pub fn seed_company(&self, company_id: CompanyId) {
        for process in [Process::PurchaseOrder, Process::PurchaseReturn] {
            for category in process.required_categories() {
                self.insert(company_id, process, *category);
            }
        }
    }

    pub fn remove(&self, company_id: CompanyId, process: Process, category: StatusCategory) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(company_id, process, category));
        }
    }
}

impl StatusCatalog for InMemoryStatusCatalog {
    fn lookup(
        &self,
        company_id: CompanyId,
        process: Process,
        category: StatusCategory,
    ) -> Option<StatusId> {
        let entries = self.entries.read().ok()?;
        entries.get(&(company_id, process, category)).copied()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflows {
    levels: RwLock<HashMap<(CompanyId, Process, u32), WorkflowConfig>>,
}

impl InMemoryWorkflows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, config: WorkflowConfig) {
        if let Ok(mut levels) = self.levels.write() {
            levels.insert((config.company_id, config.process, config.level), config);
        }
    }

    /// Configure levels 1..=n with the given approver roles.
    pub fn chain(&self, company_id: CompanyId, process: Process, roles: &[&str]) {
        for (idx, role) in roles.iter().enumerate() {
            self.configure(WorkflowConfig {
                company_id,
                process,
                level: idx as u32 + 1,
                approver_role: role.to_string(),
            });
        }
    }
}

impl WorkflowResolver for InMemoryWorkflows {
    fn resolve(&self, company_id: CompanyId, process: Process, level: u32) -> Option<WorkflowConfig> {
        let levels = self.levels.read().ok()?;
        levels.get(&(company_id, process, level)).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryItemPrices {
    prices: RwLock<HashMap<(CompanyId, ItemId), i64>>,
}

impl InMemoryItemPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, company_id: CompanyId, item_id: ItemId, price: i64) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert((company_id, item_id), price);
        }
    }
}

impl SellingPriceLookup for InMemoryItemPrices {
    fn selling_price(&self, company_id: CompanyId, item_id: ItemId) -> Option<i64> {
        let prices = self.prices.read().ok()?;
        prices.get(&(company_id, item_id)).copied()
    }
}
