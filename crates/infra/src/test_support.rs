//! Shared fixtures for the infra tests: one company with seeded catalogs.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use depotflow_core::{
    AggregateId, CompanyId, DocumentNumber, ItemId, NumberPrefix, StoreId, SupplierId, UserId,
};
use depotflow_events::{EventEnvelope, InMemoryEventBus, execute};
use depotflow_purchasing::{
    CreatePurchaseOrder, NewLine, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId,
    SupplierRef,
};
use depotflow_workflow::{Process, ProcessStatuses};

use crate::catalog::{InMemoryItemPrices, InMemoryStatusCatalog, InMemoryWorkflows};
use crate::engine::{Collaborators, ProcurementEngine};
use crate::sequence::InMemorySequenceAllocator;
use crate::settings::EngineSettings;
use crate::store::InMemoryProcurementStore;

pub(crate) type TestBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub(crate) type TestEngine = ProcurementEngine<Arc<InMemoryProcurementStore>, TestBus>;

pub(crate) struct World {
    pub company_id: CompanyId,
    pub supplier: SupplierRef,
    pub store_id: StoreId,
    pub user: UserId,
    pub catalog: Arc<InMemoryStatusCatalog>,
    pub workflows: Arc<InMemoryWorkflows>,
    pub prices: Arc<InMemoryItemPrices>,
    pub sequences: Arc<InMemorySequenceAllocator>,
    pub store: Arc<InMemoryProcurementStore>,
    pub bus: TestBus,
}

impl World {
    pub fn new() -> Self {
        let company_id = CompanyId::new();
        let catalog = Arc::new(InMemoryStatusCatalog::new());
        catalog.seed_company(company_id);
        Self {
            company_id,
            supplier: SupplierRef {
                id: SupplierId::new(),
                code: "ACME".to_string(),
            },
            store_id: StoreId::new(),
            user: UserId::new(),
            catalog,
            workflows: Arc::new(InMemoryWorkflows::new()),
            prices: Arc::new(InMemoryItemPrices::new()),
            sequences: Arc::new(InMemorySequenceAllocator::new()),
            store: Arc::new(InMemoryProcurementStore::new()),
            bus: Arc::new(InMemoryEventBus::new()),
        }
    }

    pub fn order_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    pub fn statuses(&self, process: Process) -> ProcessStatuses {
        ProcessStatuses::resolve(self.catalog.as_ref(), self.company_id, process).unwrap()
    }

    /// A new item with a selling price.
    pub fn item(&self, selling_price: i64) -> ItemId {
        let item_id = ItemId::new();
        self.prices.set_price(self.company_id, item_id, selling_price);
        item_id
    }

    pub fn engine(&self) -> TestEngine {
        self.engine_with(EngineSettings::default())
    }

    pub fn engine_with(&self, settings: EngineSettings) -> TestEngine {
        ProcurementEngine::new(
            self.store.clone(),
            self.bus.clone(),
            Collaborators {
                statuses: self.catalog.clone(),
                workflows: self.workflows.clone(),
                prices: self.prices.clone(),
                sequences: self.sequences.clone(),
            },
            settings,
        )
    }
}

/// A draft order numbered `PO-ACME-070324-<seq>`, one line per quantity.
pub(crate) fn created_order(world: &World, seq: u32, quantities: &[i64]) -> PurchaseOrder {
    let order_id = PurchaseOrderId::new(AggregateId::new());
    let number = DocumentNumber::new(
        NumberPrefix::PurchaseOrder,
        world.supplier.code.clone(),
        World::order_date(),
        seq,
    )
    .unwrap();
    let lines = quantities
        .iter()
        .map(|qty| NewLine {
            item_id: ItemId::new(),
            ordered_qty: *qty,
            unit_price: 250,
        })
        .collect();

    let mut order = PurchaseOrder::empty(order_id);
    execute(
        &mut order,
        &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            company_id: world.company_id,
            order_id,
            number,
            order_date: World::order_date(),
            supplier: world.supplier.clone(),
            store_id: world.store_id,
            lines,
            backorder_of: None,
            submit: false,
            first_level: None,
            statuses: world.statuses(Process::PurchaseOrder),
            created_by: world.user,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    order
}
