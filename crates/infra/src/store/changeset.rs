use depotflow_core::ExpectedVersion;
use depotflow_inventory::InventoryRecord;
use depotflow_purchasing::PurchaseOrder;
use depotflow_returns::ReturnRequest;

/// A record to write, with the version the writer read it at.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    pub record: T,
    pub expected: ExpectedVersion,
}

/// Every write of one engine operation, committed atomically.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    orders: Vec<Staged<PurchaseOrder>>,
    returns: Vec<Staged<ReturnRequest>>,
    inventory: Vec<Staged<InventoryRecord>>,
}

/// Expectation for a record loaded at `version` (0 = not stored yet).
pub fn expected_from(version: u64) -> ExpectedVersion {
    if version == 0 {
        ExpectedVersion::Absent
    } else {
        ExpectedVersion::Exact(version)
    }
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an order that was loaded (or created empty) at `read_version`.
    pub fn put_order(&mut self, order: PurchaseOrder, read_version: u64) -> &mut Self {
        self.orders.push(Staged {
            expected: expected_from(read_version),
            record: order,
        });
        self
    }

    pub fn put_return(&mut self, request: ReturnRequest, read_version: u64) -> &mut Self {
        self.returns.push(Staged {
            expected: expected_from(read_version),
            record: request,
        });
        self
    }

    pub fn put_inventory(&mut self, record: InventoryRecord, read_version: u64) -> &mut Self {
        self.inventory.push(Staged {
            expected: expected_from(read_version),
            record,
        });
        self
    }

    pub fn orders(&self) -> &[Staged<PurchaseOrder>] {
        &self.orders
    }

    pub fn returns(&self) -> &[Staged<ReturnRequest>] {
        &self.returns
    }

    pub fn inventory(&self) -> &[Staged<InventoryRecord>] {
        &self.inventory
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.returns.is_empty() && self.inventory.is_empty()
    }

    /// Number of staged records.
    pub fn len(&self) -> usize {
        self.orders.len() + self.returns.len() + self.inventory.len()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<Staged<PurchaseOrder>>,
        Vec<Staged<ReturnRequest>>,
        Vec<Staged<InventoryRecord>>,
    ) {
        (self.orders, self.returns, self.inventory)
    }
}
