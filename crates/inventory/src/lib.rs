//! Inventory ledger: on-hand stock with purchase-order provenance.
//!
//! Records are only ever created by receiving and only ever decremented (or
//! restored) by return reconciliation; nothing else writes them.

pub mod allocation;
pub mod prices;
pub mod record;

pub use allocation::{plan_restore, plan_withdrawal};
pub use prices::SellingPriceLookup;
pub use record::{
    InventoryCommand, InventoryEvent, InventoryRecord, InventoryRecordId, RecordReceipt,
    RestoreStock, StockReceived, StockRestored, StockWithdrawn, WithdrawStock,
};
