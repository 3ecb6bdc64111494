use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use depotflow_core::{AggregateRoot, CompanyId, DocumentNumber, ExpectedVersion, ItemId};
use depotflow_inventory::{InventoryRecord, InventoryRecordId};
use depotflow_purchasing::{PurchaseOrder, PurchaseOrderId};
use depotflow_returns::{ReturnRequest, ReturnRequestId};

use super::changeset::{Changeset, Staged};
use super::r#trait::{ProcurementStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<(CompanyId, PurchaseOrderId), PurchaseOrder>,
    returns: HashMap<(CompanyId, ReturnRequestId), ReturnRequest>,
    inventory: HashMap<(CompanyId, InventoryRecordId), InventoryRecord>,
}

/// In-memory procurement store.
///
/// Intended for tests/dev. Not optimized for performance: lookups by number,
/// order or item scan the company's records.
#[derive(Debug, Default)]
pub struct InMemoryProcurementStore {
    tables: RwLock<Tables>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

fn company_of(company_id: Option<CompanyId>, what: &str) -> Result<CompanyId, StoreError> {
    company_id.ok_or_else(|| StoreError::InvalidChangeset(format!("{what} has no company")))
}

fn check_version(
    what: &str,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{what}: expected {expected:?}, found {actual:?}"
        )))
    }
}

impl Tables {
    fn validate_orders(&self, staged: &[Staged<PurchaseOrder>]) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let mut numbers: HashSet<(CompanyId, &DocumentNumber)> = HashSet::new();
        let mut sources = HashSet::new();

        for s in staged {
            let order = &s.record;
            let company_id = company_of(order.company_id(), "purchase order")?;
            let key = (company_id, order.id_typed());
            if !seen.insert(key) {
                return Err(StoreError::InvalidChangeset(format!(
                    "purchase order {} staged twice",
                    order.id_typed()
                )));
            }
            let what = format!("purchase order {}", order.id_typed());
            check_version(&what, s.expected, self.orders.get(&key).map(|o| o.version()))?;

            if let Some(number) = order.number() {
                let taken = !numbers.insert((company_id, number))
                    || self.orders.iter().any(|((c, id), o)| {
                        *c == company_id && *id != order.id_typed() && o.number() == Some(number)
                    });
                if taken {
                    return Err(StoreError::UniqueViolation(format!(
                        "document number {number} already exists"
                    )));
                }
            }

            if let Some(source) = order.backorder_of() {
                let taken = !sources.insert((company_id, source))
                    || self.orders.iter().any(|((c, id), o)| {
                        *c == company_id
                            && *id != order.id_typed()
                            && o.backorder_of() == Some(source)
                    });
                if taken {
                    return Err(StoreError::UniqueViolation(format!(
                        "order {source} already has a backorder"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_returns(&self, staged: &[Staged<ReturnRequest>]) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let mut numbers: HashSet<(CompanyId, &DocumentNumber)> = HashSet::new();

        for s in staged {
            let request = &s.record;
            let company_id = company_of(request.company_id(), "return request")?;
            let key = (company_id, request.id_typed());
            if !seen.insert(key) {
                return Err(StoreError::InvalidChangeset(format!(
                    "return request {} staged twice",
                    request.id_typed()
                )));
            }
            let what = format!("return request {}", request.id_typed());
            check_version(&what, s.expected, self.returns.get(&key).map(|r| r.version()))?;

            if let Some(number) = request.number() {
                let taken = !numbers.insert((company_id, number))
                    || self.returns.iter().any(|((c, id), r)| {
                        *c == company_id && *id != request.id_typed() && r.number() == Some(number)
                    });
                if taken {
                    return Err(StoreError::UniqueViolation(format!(
                        "document number {number} already exists"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_inventory(&self, staged: &[Staged<InventoryRecord>]) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for s in staged {
            let record = &s.record;
            let company_id = company_of(record.company_id(), "inventory record")?;
            let key = (company_id, record.id_typed());
            if !seen.insert(key) {
                return Err(StoreError::InvalidChangeset(format!(
                    "inventory record {} staged twice",
                    record.id_typed()
                )));
            }
            let what = format!("inventory record {}", record.id_typed());
            check_version(&what, s.expected, self.inventory.get(&key).map(|r| r.version()))?;
        }
        Ok(())
    }
}

impl ProcurementStore for InMemoryProcurementStore {
    fn load_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.orders.get(&(company_id, order_id)).cloned())
    }

    fn find_order_by_number(
        &self,
        company_id: CompanyId,
        number: &DocumentNumber,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .orders
            .iter()
            .find(|((c, _), o)| *c == company_id && o.number() == Some(number))
            .map(|(_, o)| o.clone()))
    }

    fn find_backorder_of(
        &self,
        company_id: CompanyId,
        source: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .orders
            .iter()
            .find(|((c, _), o)| *c == company_id && o.backorder_of() == Some(source))
            .map(|(_, o)| o.clone()))
    }

    fn load_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.returns.get(&(company_id, return_id)).cloned())
    }

    fn returns_for_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Vec<ReturnRequest>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut returns: Vec<ReturnRequest> = tables
            .returns
            .iter()
            .filter(|((c, _), r)| *c == company_id && r.order_id() == Some(order_id))
            .map(|(_, r)| r.clone())
            .collect();
        returns.sort_by_key(|r| r.id_typed());
        Ok(returns)
    }

    fn inventory_for(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut records: Vec<InventoryRecord> = tables
            .inventory
            .iter()
            .filter(|((c, _), r)| {
                *c == company_id
                    && r.source_order() == Some(order_id.0)
                    && r.item_id() == Some(item_id)
            })
            .map(|(_, r)| r.clone())
            .collect();
        records.sort_by_key(|r| (r.received_on(), r.id_typed()));
        Ok(records)
    }

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        if changeset.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().map_err(|_| poisoned())?;

        // Validate everything before the first write.
        tables.validate_orders(changeset.orders())?;
        tables.validate_returns(changeset.returns())?;
        tables.validate_inventory(changeset.inventory())?;

        let (orders, returns, inventory) = changeset.into_parts();
        for Staged { record, .. } in orders {
            if let Some(company_id) = record.company_id() {
                tables.orders.insert((company_id, record.id_typed()), record);
            }
        }
        for Staged { record, .. } in returns {
            if let Some(company_id) = record.company_id() {
                tables.returns.insert((company_id, record.id_typed()), record);
            }
        }
        for Staged { record, .. } in inventory {
            if let Some(company_id) = record.company_id() {
                tables.inventory.insert((company_id, record.id_typed()), record);
            }
        }

        Ok(())
    }
}
