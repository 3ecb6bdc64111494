//! Procurement engine: the application-level orchestration of purchase
//! orders, return requests and the inventory they move.
//!
//! Every operation runs the same pipeline:
//!
//! ```text
//! resolve configuration (status catalog, workflow level)
//!   ↓
//! lock the purchase order the operation touches
//!   ↓
//! load current state
//!   ↓
//! decide (pure aggregate `handle`, then `apply`)
//!   ↓
//! commit one Changeset (all records, version-checked, all or nothing)
//!   ↓
//! publish the emitted events
//! ```
//!
//! A rejected decision leaves nothing behind: the loaded copies are dropped
//! and no events are published. Publication happens only after the commit
//! succeeded; delivery is at-least-once.

mod orders;
mod returns;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error};
use uuid::Uuid;

use depotflow_core::{AggregateId, CompanyId, DomainError, ItemId};
use depotflow_events::{Event, EventBus, EventEnvelope};
use depotflow_inventory::{InventoryRecord, SellingPriceLookup};
use depotflow_purchasing::{PurchaseOrder, PurchaseOrderId};
use depotflow_returns::{ReturnRequest, ReturnRequestId};
use depotflow_workflow::{
    ApprovalTrail, Process, ProcessStatuses, StatusCatalog, WorkflowConfig, WorkflowResolver,
};

use crate::error::EngineError;
use crate::locks::DocumentLocks;
use crate::sequence::SequenceAllocator;
use crate::settings::EngineSettings;
use crate::store::{Changeset, ProcurementStore};

pub use orders::NewPurchaseOrder;
pub use returns::{NewReturnRequest, ReturnRevision};

pub const ORDER_AGGREGATE: &str = "purchasing.order";
pub const RETURN_AGGREGATE: &str = "returns.request";
pub const INVENTORY_AGGREGATE: &str = "inventory.record";

/// Read-only collaborators the engine resolves configuration from.
#[derive(Clone)]
pub struct Collaborators {
    pub statuses: Arc<dyn StatusCatalog>,
    pub workflows: Arc<dyn WorkflowResolver>,
    pub prices: Arc<dyn SellingPriceLookup>,
    pub sequences: Arc<dyn SequenceAllocator>,
}

/// Events waiting for the commit, already wrapped for publication.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    envelopes: Vec<EventEnvelope<JsonValue>>,
}

impl Outbox {
    /// Wrap `events` emitted by an aggregate that was at `read_version`.
    pub(crate) fn record<E>(
        &mut self,
        company_id: CompanyId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        read_version: u64,
        events: &[E],
    ) -> Result<(), EngineError>
    where
        E: Event + Serialize,
    {
        for (offset, event) in events.iter().enumerate() {
            let payload = serde_json::to_value(event)?;
            self.envelopes.push(EventEnvelope::new(
                Uuid::now_v7(),
                company_id,
                aggregate_id,
                aggregate_type,
                read_version + offset as u64 + 1,
                event.event_type(),
                payload,
            ));
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.envelopes.len()
    }
}

/// The engine service.
///
/// - `S`: record store (in-memory for tests/dev)
/// - `B`: event bus the committed events are published on
pub struct ProcurementEngine<S, B> {
    store: S,
    bus: B,
    statuses: Arc<dyn StatusCatalog>,
    workflows: Arc<dyn WorkflowResolver>,
    prices: Arc<dyn SellingPriceLookup>,
    sequences: Arc<dyn SequenceAllocator>,
    locks: DocumentLocks,
    settings: EngineSettings,
}

impl<S, B> ProcurementEngine<S, B> {
    pub fn new(store: S, bus: B, collaborators: Collaborators, settings: EngineSettings) -> Self {
        Self {
            store,
            bus,
            statuses: collaborators.statuses,
            workflows: collaborators.workflows,
            prices: collaborators.prices,
            sequences: collaborators.sequences,
            locks: DocumentLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn process_statuses(
        &self,
        company_id: CompanyId,
        process: Process,
    ) -> Result<ProcessStatuses, EngineError> {
        Ok(ProcessStatuses::resolve(
            self.statuses.as_ref(),
            company_id,
            process,
        )?)
    }

    fn first_level(&self, company_id: CompanyId, process: Process) -> Option<WorkflowConfig> {
        self.workflows.first_level(company_id, process)
    }

    /// Level after the trail's pending step; `None` when that step is the
    /// last configured level (or nothing is pending).
    fn next_level(
        &self,
        company_id: CompanyId,
        process: Process,
        trail: &ApprovalTrail,
    ) -> Option<WorkflowConfig> {
        let pending = trail.pending_step()?;
        self.workflows.resolve(company_id, process, pending.level + 1)
    }
}

impl<S, B> ProcurementEngine<S, B>
where
    S: ProcurementStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn commit(&self, changeset: Changeset, outbox: Outbox) -> Result<(), EngineError> {
        let staged = changeset.len();
        self.store.commit(changeset).map_err(|err| {
            let err = EngineError::from(err);
            if !err.is_retryable() {
                error!(error = %err, staged, "changeset commit failed");
            }
            err
        })?;
        debug!(staged, events = outbox.len(), "changeset committed");

        for envelope in outbox.envelopes {
            self.bus.publish(envelope).map_err(|err| {
                error!(error = ?err, "event publication failed after commit");
                EngineError::Publish(format!("{err:?}"))
            })?;
        }
        Ok(())
    }

    fn require_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, EngineError> {
        self.store
            .load_order(company_id, order_id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn require_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<ReturnRequest, EngineError> {
        self.store
            .load_return(company_id, return_id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub fn order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, EngineError> {
        Ok(self.store.load_order(company_id, order_id)?)
    }

    pub fn return_request(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, EngineError> {
        Ok(self.store.load_return(company_id, return_id)?)
    }

    /// The backorder spawned from `source`, if any.
    pub fn backorder_of(
        &self,
        company_id: CompanyId,
        source: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, EngineError> {
        Ok(self.store.find_backorder_of(company_id, source)?)
    }

    pub fn returns_for_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<Vec<ReturnRequest>, EngineError> {
        Ok(self.store.returns_for_order(company_id, order_id)?)
    }

    pub fn inventory_for(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryRecord>, EngineError> {
        Ok(self.store.inventory_for(company_id, order_id, item_id)?)
    }

    /// Quantity of `item_id` on every return raised against the order.
    pub fn already_returned(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<u32, EngineError> {
        let returns = self.store.returns_for_order(company_id, order_id)?;
        Ok(depotflow_returns::already_returned(&returns, order_id, item_id))
    }

    /// Received quantity of `item_id` not yet claimed by a return.
    pub fn returnable_qty(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        item_id: ItemId,
    ) -> Result<u32, EngineError> {
        let order = self.require_order(company_id, order_id)?;
        let returns = self.store.returns_for_order(company_id, order_id)?;
        Ok(depotflow_returns::returnable_qty(&order, &returns, item_id))
    }
}
