//! Backorder derivation: the unfulfilled remainder of a partial receipt.

use depotflow_core::{DomainError, DomainResult};
use depotflow_workflow::Stage;

use crate::order::{NewLine, PurchaseOrder};

/// Lines of the backorder to spawn from `source`.
///
/// Only lines with `received < ordered` are carried, for the outstanding
/// quantity, at the source line's frozen unit price. The "at most one
/// backorder" check is repeated by `LinkBackorder` inside the commit.
pub fn plan_backorder(source: &PurchaseOrder) -> DomainResult<Vec<NewLine>> {
    if !source.is_created() {
        return Err(DomainError::not_found());
    }
    if !source.is_active() {
        return Err(DomainError::conflict("purchase order is deactivated"));
    }
    if let Some(existing) = source.backorder() {
        return Err(DomainError::conflict(format!(
            "backorder {existing} already exists for this order"
        )));
    }
    if source.stage() != Stage::PartiallyReceived {
        return Err(DomainError::conflict(format!(
            "only partially received orders can be backordered (stage {:?})",
            source.stage()
        )));
    }

    let lines: Vec<NewLine> = source
        .lines()
        .iter()
        .filter(|l| l.remaining_qty() > 0)
        .map(|l| NewLine {
            item_id: l.item_id,
            ordered_qty: i64::from(l.remaining_qty()),
            unit_price: l.unit_price,
        })
        .collect();

    if lines.is_empty() {
        return Err(DomainError::invariant(
            "partially received order has no outstanding lines",
        ));
    }
    Ok(lines)
}
