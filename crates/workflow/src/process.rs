use serde::{Deserialize, Serialize};

use crate::status::StatusCategory;

/// An approvable process type. Status catalogs and workflow chains are
/// configured per process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    PurchaseOrder,
    PurchaseReturn,
}

impl Process {
    /// Configuration key of the process.
    pub fn name(self) -> &'static str {
        match self {
            Process::PurchaseOrder => "purchase_order",
            Process::PurchaseReturn => "purchase_return",
        }
    }

    /// Catalog entries that must exist before any document of this process
    /// may change state.
    pub fn required_categories(self) -> &'static [StatusCategory] {
        match self {
            Process::PurchaseOrder => &[
                StatusCategory::OrderCreated,
                StatusCategory::ApprovalPending,
                StatusCategory::ApproverCompleted,
                StatusCategory::OrderIssued,
                StatusCategory::PartiallyReceived,
                StatusCategory::Received,
                StatusCategory::Cancelled,
            ],
            Process::PurchaseReturn => &[
                StatusCategory::ReturnCreated,
                StatusCategory::ApprovalPending,
                StatusCategory::ApproverCompleted,
            ],
        }
    }
}

impl core::fmt::Display for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
