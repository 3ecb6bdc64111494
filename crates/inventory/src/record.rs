use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depotflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DomainError, ItemId, StoreId,
};
use depotflow_events::Event;

/// Inventory record identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryRecordId(pub AggregateId);

impl InventoryRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: one receipt of an item into a store, traced to the
/// purchase order it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    id: InventoryRecordId,
    company_id: Option<CompanyId>,
    item_id: Option<ItemId>,
    store_id: Option<StoreId>,
    source_order: Option<AggregateId>,
    received_qty: u32,
    on_hand: u32,
    unit_cost: i64,
    sale_price: i64,
    received_on: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryRecord {
    /// Create an empty, not-yet-created record (target of `RecordReceipt`).
    pub fn empty(id: InventoryRecordId) -> Self {
        Self {
            id,
            company_id: None,
            item_id: None,
            store_id: None,
            source_order: None,
            received_qty: 0,
            on_hand: 0,
            unit_cost: 0,
            sale_price: 0,
            received_on: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryRecordId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    /// Purchase order this stock was received against.
    pub fn source_order(&self) -> Option<AggregateId> {
        self.source_order
    }

    /// Quantity originally received into this record.
    pub fn received_qty(&self) -> u32 {
        self.received_qty
    }

    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    pub fn unit_cost(&self) -> i64 {
        self.unit_cost
    }

    pub fn sale_price(&self) -> i64 {
        self.sale_price
    }

    pub fn received_on(&self) -> Option<DateTime<Utc>> {
        self.received_on
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordReceipt (creates the record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub item_id: ItemId,
    pub store_id: StoreId,
    pub source_order: AggregateId,
    pub quantity: u32,
    pub unit_cost: i64,
    pub sale_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawStock (goods returned to the supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawStock {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub quantity: u32,
    pub source_return: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreStock (an accepted return re-opened for approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStock {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub quantity: u32,
    pub source_return: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RecordReceipt(RecordReceipt),
    WithdrawStock(WithdrawStock),
    RestoreStock(RestoreStock),
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub item_id: ItemId,
    pub store_id: StoreId,
    pub source_order: AggregateId,
    pub quantity: u32,
    pub unit_cost: i64,
    pub sale_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWithdrawn {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub quantity: u32,
    pub source_return: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRestored {
    pub company_id: CompanyId,
    pub record_id: InventoryRecordId,
    pub quantity: u32,
    pub source_return: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockReceived(StockReceived),
    StockWithdrawn(StockWithdrawn),
    StockRestored(StockRestored),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockReceived(_) => "inventory.record.stock_received",
            InventoryEvent::StockWithdrawn(_) => "inventory.record.stock_withdrawn",
            InventoryEvent::StockRestored(_) => "inventory.record.stock_restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockReceived(e) => e.occurred_at,
            InventoryEvent::StockWithdrawn(e) => e.occurred_at,
            InventoryEvent::StockRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::StockReceived(e) => {
                self.id = e.record_id;
                self.company_id = Some(e.company_id);
                self.item_id = Some(e.item_id);
                self.store_id = Some(e.store_id);
                self.source_order = Some(e.source_order);
                self.received_qty = e.quantity;
                self.on_hand = e.quantity;
                self.unit_cost = e.unit_cost;
                self.sale_price = e.sale_price;
                self.received_on = Some(e.occurred_at);
                self.created = true;
            }
            InventoryEvent::StockWithdrawn(e) => {
                self.on_hand -= e.quantity;
            }
            InventoryEvent::StockRestored(e) => {
                self.on_hand += e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RecordReceipt(cmd) => self.handle_receipt(cmd),
            InventoryCommand::WithdrawStock(cmd) => self.handle_withdraw(cmd),
            InventoryCommand::RestoreStock(cmd) => self.handle_restore(cmd),
        }
    }
}

impl InventoryRecord {
    fn ensure_company(&self, company_id: CompanyId) -> Result<(), DomainError> {
        if self.company_id != Some(company_id) {
            return Err(DomainError::invariant("company mismatch"));
        }
        Ok(())
    }

    fn ensure_record_id(&self, record_id: InventoryRecordId) -> Result<(), DomainError> {
        if self.id != record_id {
            return Err(DomainError::invariant("record_id mismatch"));
        }
        Ok(())
    }

    fn handle_receipt(&self, cmd: &RecordReceipt) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("inventory record already exists"));
        }
        self.ensure_record_id(cmd.record_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation(
                "quantity",
                "received quantity must be positive",
            ));
        }
        if cmd.unit_cost < 0 || cmd.sale_price < 0 {
            return Err(DomainError::validation("unit_cost", "prices cannot be negative"));
        }

        Ok(vec![InventoryEvent::StockReceived(StockReceived {
            company_id: cmd.company_id,
            record_id: cmd.record_id,
            item_id: cmd.item_id,
            store_id: cmd.store_id,
            source_order: cmd.source_order,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            sale_price: cmd.sale_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &WithdrawStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company(cmd.company_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity", "quantity cannot be zero"));
        }
        if cmd.quantity > self.on_hand {
            return Err(DomainError::validation(
                "quantity",
                format!(
                    "cannot withdraw {} from record {}; only {} on hand",
                    cmd.quantity, self.id, self.on_hand
                ),
            ));
        }

        Ok(vec![InventoryEvent::StockWithdrawn(StockWithdrawn {
            company_id: cmd.company_id,
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            source_return: cmd.source_return,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company(cmd.company_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity", "quantity cannot be zero"));
        }
        if self.on_hand + cmd.quantity > self.received_qty {
            return Err(DomainError::invariant(
                "restored stock cannot exceed the quantity originally received",
            ));
        }

        Ok(vec![InventoryEvent::StockRestored(StockRestored {
            company_id: cmd.company_id,
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            source_return: cmd.source_return,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
pub(crate) fn received(cmd: RecordReceipt) -> Result<InventoryRecord, DomainError> {
    let mut record = InventoryRecord::empty(cmd.record_id);
    depotflow_events::execute(&mut record, &InventoryCommand::RecordReceipt(cmd))?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(quantity: u32) -> RecordReceipt {
        RecordReceipt {
            company_id: CompanyId::new(),
            record_id: InventoryRecordId::new(AggregateId::new()),
            item_id: ItemId::new(),
            store_id: StoreId::new(),
            source_order: AggregateId::new(),
            quantity,
            unit_cost: 1_250,
            sale_price: 1_999,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn receipt_sets_on_hand_and_prices() {
        let cmd = receipt(6);
        let record = received(cmd.clone()).unwrap();
        assert_eq!(record.on_hand(), 6);
        assert_eq!(record.received_qty(), 6);
        assert_eq!(record.unit_cost(), 1_250);
        assert_eq!(record.sale_price(), 1_999);
        assert_eq!(record.source_order(), Some(cmd.source_order));
        assert_eq!(record.version(), 1);
    }

    #[test]
    fn zero_quantity_receipt_is_rejected() {
        let err = received(receipt(0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn withdraw_cannot_go_below_zero() {
        let cmd = receipt(3);
        let mut record = received(cmd.clone()).unwrap();

        let withdraw = |quantity| {
            InventoryCommand::WithdrawStock(WithdrawStock {
                company_id: cmd.company_id,
                record_id: cmd.record_id,
                quantity,
                source_return: AggregateId::new(),
                occurred_at: Utc::now(),
            })
        };

        assert!(record.handle(&withdraw(4)).is_err());
        depotflow_events::execute(&mut record, &withdraw(3)).unwrap();
        assert_eq!(record.on_hand(), 0);
    }

    #[test]
    fn restore_is_capped_by_received_quantity() {
        let cmd = receipt(5);
        let mut record = received(cmd.clone()).unwrap();
        depotflow_events::execute(
            &mut record,
            &InventoryCommand::WithdrawStock(WithdrawStock {
                company_id: cmd.company_id,
                record_id: cmd.record_id,
                quantity: 2,
                source_return: AggregateId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let restore = |quantity| {
            InventoryCommand::RestoreStock(RestoreStock {
                company_id: cmd.company_id,
                record_id: cmd.record_id,
                quantity,
                source_return: AggregateId::new(),
                occurred_at: Utc::now(),
            })
        };
        assert!(matches!(
            record.handle(&restore(3)),
            Err(DomainError::InvariantViolation(_))
        ));
        depotflow_events::execute(&mut record, &restore(2)).unwrap();
        assert_eq!(record.on_hand(), 5);
    }

    #[test]
    fn commands_from_another_company_are_rejected() {
        let cmd = receipt(5);
        let record = received(cmd.clone()).unwrap();
        let err = record
            .handle(&InventoryCommand::WithdrawStock(WithdrawStock {
                company_id: CompanyId::new(),
                record_id: cmd.record_id,
                quantity: 1,
                source_return: AggregateId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
