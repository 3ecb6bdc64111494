//! Return requests: sending previously received goods back to the supplier.
//!
//! A return is raised against a received (or partially received) purchase
//! order, goes through its own approval trail, and once accepted takes the
//! returned quantities back out of inventory.

pub mod reconcile;
pub mod request;

pub use reconcile::{
    OrderReturnables, ReturnLine, ReturnableLine, already_returned, returnable_qty,
    validate_return,
};
pub use request::{
    ApproveReturnRequest, AttachmentMeta, CreateReturnRequest, RejectReturnRequest,
    ResubmitReturnRequest, ReturnAccepted, ReturnApprovalRequired, ReturnInventoryReopened,
    ReturnRequest, ReturnRequestApproved, ReturnRequestCommand, ReturnRequestCreated,
    ReturnRequestEvent, ReturnRequestId, ReturnRequestItem, ReturnRequestRejected,
    ReturnRequestResubmitted, ReturnSubmitted,
};
