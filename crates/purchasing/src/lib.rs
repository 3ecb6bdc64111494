//! Purchasing domain module (purchase orders).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no storage). The engine in
//! `depotflow-infra` resolves configuration, runs these aggregates and commits
//! the outcome.

pub mod backorder;
pub mod order;
pub mod receiving;

pub use backorder::plan_backorder;
pub use order::{
    ApprovalRequired, ApprovePurchaseOrder, BackorderLinked, CancelPurchaseOrder, CancelReason,
    Cancellation, CreatePurchaseOrder, DeactivatePurchaseOrder, GoodsReceived,
    IssuePurchaseOrder, LinkBackorder, NewLine, PurchaseOrder, PurchaseOrderApproved,
    PurchaseOrderCancelled, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderDeactivated, PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderIssued,
    PurchaseOrderItem, PurchaseOrderRejected, PurchaseOrderSubmitted, ReceiveGoods,
    RejectPurchaseOrder, SubmitPurchaseOrder, SupplierRef,
};
pub use receiving::{LineReceipt, ReceiptEntry, ReceiptPlan, plan_receipt};
