//! Receiving reconciliation: entered quantities against ordered quantities.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use depotflow_core::{DomainError, DomainResult, FieldViolation, ItemId};
use depotflow_workflow::Stage;

use crate::order::PurchaseOrderItem;

/// Quantity entered by the receiving clerk for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEntry {
    pub line_no: u32,
    pub received_qty: i64,
}

/// Validated receipt of one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceipt {
    pub line_no: u32,
    pub item_id: ItemId,
    pub received_qty: u32,
    /// Frozen order-time unit price; becomes the inventory unit cost.
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPlan {
    /// One receipt per order line, in line order. Lines without an entry
    /// received nothing.
    pub receipts: Vec<LineReceipt>,
    /// `Received` when every line is complete, `PartiallyReceived` otherwise.
    pub outcome: Stage,
}

impl ReceiptPlan {
    /// Receipts that put stock on hand.
    pub fn stocked(&self) -> impl Iterator<Item = &LineReceipt> {
        self.receipts.iter().filter(|r| r.received_qty > 0)
    }
}

/// Validate a batch of entries and decide the receiving outcome.
///
/// The batch is all-or-nothing: every offending entry is reported and no
/// plan is produced when any entry is out of range, unknown or repeated.
pub fn plan_receipt(
    lines: &[PurchaseOrderItem],
    entries: &[ReceiptEntry],
) -> DomainResult<ReceiptPlan> {
    if entries.is_empty() {
        return Err(DomainError::validation(
            "entries",
            "enter a received quantity for at least one line",
        ));
    }

    let mut violations = Vec::new();
    let mut seen = BTreeSet::new();
    for (idx, entry) in entries.iter().enumerate() {
        let Some(line) = lines.iter().find(|l| l.line_no == entry.line_no) else {
            violations.push(FieldViolation::new(
                format!("entries[{idx}].line_no"),
                format!("line {} is not on this order", entry.line_no),
            ));
            continue;
        };
        if !seen.insert(entry.line_no) {
            violations.push(FieldViolation::new(
                format!("entries[{idx}].line_no"),
                format!("line {} entered more than once", entry.line_no),
            ));
            continue;
        }
        if entry.received_qty < 0 {
            violations.push(FieldViolation::new(
                format!("entries[{idx}].received_qty"),
                "received quantity cannot be negative",
            ));
        } else if entry.received_qty > i64::from(line.ordered_qty) {
            violations.push(FieldViolation::new(
                format!("entries[{idx}].received_qty"),
                format!(
                    "received quantity {} exceeds ordered quantity {}",
                    entry.received_qty, line.ordered_qty
                ),
            ));
        }
    }
    if !violations.is_empty() {
        return Err(DomainError::Validation(violations));
    }

    let receipts: Vec<LineReceipt> = lines
        .iter()
        .map(|line| {
            let qty = entries
                .iter()
                .find(|e| e.line_no == line.line_no)
                .map(|e| e.received_qty as u32)
                .unwrap_or(0);
            LineReceipt {
                line_no: line.line_no,
                item_id: line.item_id,
                received_qty: qty,
                unit_price: line.unit_price,
            }
        })
        .collect();

    let complete = lines
        .iter()
        .zip(&receipts)
        .all(|(line, r)| r.received_qty == line.ordered_qty);

    Ok(ReceiptPlan {
        receipts,
        outcome: if complete {
            Stage::Received
        } else {
            Stage::PartiallyReceived
        },
    })
}
