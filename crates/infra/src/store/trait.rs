use std::sync::Arc;

use thiserror::Error;

use depotflow_core::{CompanyId, DocumentNumber, ItemId};
use depotflow_inventory::InventoryRecord;
use depotflow_purchasing::{PurchaseOrder, PurchaseOrderId};
use depotflow_returns::{ReturnRequest, ReturnRequestId};

use super::changeset::Changeset;

/// Store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, uniqueness) as
/// opposed to domain errors (validation, invariants).
///
/// ## Error Categories
///
/// - **Concurrency**: a staged record's expected version did not match
/// - **UniqueViolation**: document number or backorder source already taken
/// - **InvalidChangeset**: the changeset itself is malformed
/// - **Unavailable**: the backend cannot serve the request (poisoned lock, IO)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("invalid changeset: {0}")]
    InvalidChangeset(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Company-scoped persistence of orders, returns and inventory records.
///
/// Records are stored as current state together with their version. Reads
/// never cross companies. `commit` applies a whole [`Changeset`] or nothing:
/// every staged record's `ExpectedVersion` and every unique constraint is
/// checked before the first write.
pub trait ProcurementStore: Send + Sync {
    fn load_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    fn find_order_by_number(
        &self,
        company_id: CompanyId,
        number: &DocumentNumber,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    /// The backorder spawned from `source`, if any.
    fn find_backorder_of(
        &self,
        company_id: CompanyId,
        source: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    fn load_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, StoreError>;

    /// Every return raised against `order_id`, whatever its status.
    fn returns_for_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Vec<ReturnRequest>, StoreError>;

    /// Inventory records received for `item_id` against `order_id`.
    fn inventory_for(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryRecord>, StoreError>;

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError>;
}

impl<S> ProcurementStore for Arc<S>
where
    S: ProcurementStore + ?Sized,
{
    fn load_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).load_order(company_id, order_id)
    }

    fn find_order_by_number(
        &self,
        company_id: CompanyId,
        number: &DocumentNumber,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).find_order_by_number(company_id, number)
    }

    fn find_backorder_of(
        &self,
        company_id: CompanyId,
        source: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).find_backorder_of(company_id, source)
    }

    fn load_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        (**self).load_return(company_id, return_id)
    }

    fn returns_for_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Vec<ReturnRequest>, StoreError> {
        (**self).returns_for_order(company_id, order_id)
    }

    fn inventory_for(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).inventory_for(company_id, order_id, item_id)
    }

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        (**self).commit(changeset)
    }
}
