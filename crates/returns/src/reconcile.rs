//! Return reconciliation: how much of an order may still go back.
//!
//! `already_returned` counts every return raised against the order whatever
//! its status, because an accepted return is treated as executed and a
//! pending one has already been promised to the supplier.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use depotflow_core::{DomainError, DomainResult, FieldViolation, ItemId};
use depotflow_purchasing::{PurchaseOrder, PurchaseOrderId, SupplierRef};
use depotflow_workflow::Stage;

use crate::request::{ReturnRequest, ReturnRequestItem};

/// Line as entered on a return request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub item_id: ItemId,
    pub returned_qty: i64,
    pub reason: Option<String>,
}

/// Return position of one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnableLine {
    pub item_id: ItemId,
    pub received_qty: u32,
    /// Sum over every return against the order, including the one being edited.
    pub already_returned: u32,
    /// Frozen order-line unit price.
    pub unit_price: i64,
}

impl ReturnableLine {
    pub fn returnable_qty(&self) -> u32 {
        self.received_qty.saturating_sub(self.already_returned)
    }
}

/// Snapshot of an order taken under its document lock, handed to the return
/// aggregate so it can validate without IO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReturnables {
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub order_stage: Stage,
    pub lines: Vec<ReturnableLine>,
}

impl OrderReturnables {
    pub fn collect(order: &PurchaseOrder, returns: &[ReturnRequest]) -> DomainResult<Self> {
        let supplier = order
            .supplier()
            .cloned()
            .ok_or_else(|| DomainError::invariant("purchase order has no supplier"))?;
        let order_id = order.id_typed();

        Ok(Self {
            order_id,
            supplier,
            order_stage: order.stage(),
            lines: order
                .lines()
                .iter()
                .map(|line| ReturnableLine {
                    item_id: line.item_id,
                    received_qty: line.received_qty.unwrap_or(0),
                    already_returned: already_returned(returns, order_id, line.item_id),
                    unit_price: line.unit_price,
                })
                .collect(),
        })
    }

    pub fn line(&self, item_id: ItemId) -> Option<&ReturnableLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Returns may only be raised against goods that were actually received.
    pub fn ensure_received(&self) -> DomainResult<()> {
        match self.order_stage {
            Stage::Received | Stage::PartiallyReceived => Ok(()),
            other => Err(DomainError::conflict(format!(
                "order {} has not been received (stage {other:?})",
                self.order_id
            ))),
        }
    }
}

/// Quantity of `item_id` on every return referencing `order_id`.
pub fn already_returned(
    returns: &[ReturnRequest],
    order_id: PurchaseOrderId,
    item_id: ItemId,
) -> u32 {
    returns
        .iter()
        .filter(|r| r.order_id() == Some(order_id))
        .flat_map(|r| r.lines())
        .filter(|l| l.item_id == item_id)
        .map(|l| l.returned_qty)
        .sum()
}

/// `received - already_returned` for one item of an order.
pub fn returnable_qty(order: &PurchaseOrder, returns: &[ReturnRequest], item_id: ItemId) -> u32 {
    order
        .received_qty_of(item_id)
        .saturating_sub(already_returned(returns, order.id_typed(), item_id))
}

/// Validate entered return lines and price them.
///
/// `original` holds the lines of the return being edited (empty for a new
/// one); they are subtracted from `already_returned` first, since an edited
/// line does not come in addition to itself.
pub fn validate_return(
    order: &OrderReturnables,
    lines: &[ReturnLine],
    original: &[ReturnRequestItem],
) -> DomainResult<Vec<ReturnRequestItem>> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "lines",
            "a return needs at least one line",
        ));
    }

    let mut violations = Vec::new();
    let mut seen = BTreeSet::new();
    let mut items = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let Some(position) = order.line(line.item_id) else {
            violations.push(FieldViolation::new(
                format!("lines[{idx}].item_id"),
                format!("item {} is not on order {}", line.item_id, order.order_id),
            ));
            continue;
        };
        if !seen.insert(line.item_id) {
            violations.push(FieldViolation::new(
                format!("lines[{idx}].item_id"),
                format!("item {} appears on more than one line", line.item_id),
            ));
            continue;
        }

        let reason = line
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if reason.is_none() {
            violations.push(FieldViolation::new(
                format!("lines[{idx}].reason"),
                "a return reason is required",
            ));
        }

        if line.returned_qty < 1 {
            violations.push(FieldViolation::new(
                format!("lines[{idx}].returned_qty"),
                "returned quantity must be at least 1",
            ));
            continue;
        }

        let own: u32 = original
            .iter()
            .filter(|o| o.item_id == line.item_id)
            .map(|o| o.returned_qty)
            .sum();
        let effective_already = position.already_returned.saturating_sub(own);
        let returnable = position.received_qty.saturating_sub(effective_already);
        if line.returned_qty > i64::from(returnable) {
            violations.push(FieldViolation::new(
                format!("lines[{idx}].returned_qty"),
                format!(
                    "cannot return {}; only {returnable} of {} received remain returnable",
                    line.returned_qty, position.received_qty
                ),
            ));
            continue;
        }

        if let Some(reason) = reason {
            items.push(ReturnRequestItem {
                item_id: line.item_id,
                returned_qty: line.returned_qty as u32,
                unit_price: position.unit_price,
                reason: reason.to_string(),
            });
        }
    }

    if !violations.is_empty() {
        return Err(DomainError::Validation(violations));
    }
    Ok(items)
}
