//! Spreading a returned quantity over the records of one {order, item}.
//!
//! Receiving writes one record per order line, so in practice there is a
//! single candidate. Several records (e.g. migrated data) are consumed
//! oldest-first and restored in the same order.

use depotflow_core::{DomainError, DomainResult};

use crate::record::{InventoryRecord, InventoryRecordId};

fn oldest_first(records: &[InventoryRecord]) -> Vec<&InventoryRecord> {
    let mut sorted: Vec<&InventoryRecord> = records.iter().collect();
    sorted.sort_by_key(|r| (r.received_on(), r.id_typed()));
    sorted
}

/// Split `quantity` into per-record withdrawals.
pub fn plan_withdrawal(
    records: &[InventoryRecord],
    quantity: u32,
) -> DomainResult<Vec<(InventoryRecordId, u32)>> {
    let available: u64 = records.iter().map(|r| u64::from(r.on_hand())).sum();
    if u64::from(quantity) > available {
        return Err(DomainError::validation(
            "returned_qty",
            format!("cannot take {quantity} out of inventory; only {available} on hand"),
        ));
    }

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for record in oldest_first(records) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(record.on_hand());
        if take > 0 {
            plan.push((record.id_typed(), take));
            remaining -= take;
        }
    }
    Ok(plan)
}

/// Split `quantity` into per-record restorations, never exceeding what each
/// record originally received.
pub fn plan_restore(
    records: &[InventoryRecord],
    quantity: u32,
) -> DomainResult<Vec<(InventoryRecordId, u32)>> {
    let capacity: u64 = records
        .iter()
        .map(|r| u64::from(r.received_qty() - r.on_hand()))
        .sum();
    if u64::from(quantity) > capacity {
        return Err(DomainError::invariant(format!(
            "cannot restore {quantity} units; records only miss {capacity}"
        )));
    }

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for record in oldest_first(records) {
        if remaining == 0 {
            break;
        }
        let room = record.received_qty() - record.on_hand();
        let put = remaining.min(room);
        if put > 0 {
            plan.push((record.id_typed(), put));
            remaining -= put;
        }
    }
    Ok(plan)
}
