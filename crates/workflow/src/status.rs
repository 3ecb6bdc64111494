//! Status catalog: symbolic sub-categories mapped to opaque status ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use depotflow_core::{CompanyId, DomainError, DomainResult, StatusId};

use crate::lifecycle::Stage;
use crate::process::Process;

/// Symbolic status sub-category, as configured in the status catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCategory {
    OrderCreated,
    ReturnCreated,
    ApprovalPending,
    ApproverCompleted,
    OrderIssued,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl StatusCategory {
    pub fn code(self) -> &'static str {
        match self {
            StatusCategory::OrderCreated => "ORDER_CREATED",
            StatusCategory::ReturnCreated => "RETURN_CREATED",
            StatusCategory::ApprovalPending => "APPROVAL_PENDING",
            StatusCategory::ApproverCompleted => "APPROVER_COMPLETED",
            StatusCategory::OrderIssued => "ORDER_ISSUED",
            StatusCategory::PartiallyReceived => "PARTIALLY_RECEIVED",
            StatusCategory::Received => "RECEIVED",
            StatusCategory::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Read-only status catalog collaborator.
pub trait StatusCatalog: Send + Sync {
    fn lookup(
        &self,
        company_id: CompanyId,
        process: Process,
        category: StatusCategory,
    ) -> Option<StatusId>;
}

impl<C> StatusCatalog for Arc<C>
where
    C: StatusCatalog + ?Sized,
{
    fn lookup(
        &self,
        company_id: CompanyId,
        process: Process,
        category: StatusCategory,
    ) -> Option<StatusId> {
        (**self).lookup(company_id, process, category)
    }
}

/// Every status id a process needs, resolved up front.
///
/// Construction fails with `DomainError::Configuration` when any required
/// category is missing, so a half-configured process never transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatuses {
    process: Process,
    ids: BTreeMap<StatusCategory, StatusId>,
}

impl ProcessStatuses {
    pub fn new(
        process: Process,
        ids: impl IntoIterator<Item = (StatusCategory, StatusId)>,
    ) -> DomainResult<Self> {
        let ids: BTreeMap<_, _> = ids.into_iter().collect();
        let missing: Vec<&str> = process
            .required_categories()
            .iter()
            .filter(|c| !ids.contains_key(c))
            .map(|c| c.code())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::configuration(format!(
                "status catalog for process '{process}' is missing: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { process, ids })
    }

    /// Resolve all required entries for `process` from a catalog.
    pub fn resolve(
        catalog: &dyn StatusCatalog,
        company_id: CompanyId,
        process: Process,
    ) -> DomainResult<Self> {
        Self::new(
            process,
            process
                .required_categories()
                .iter()
                .filter_map(|c| catalog.lookup(company_id, process, *c).map(|id| (*c, id))),
        )
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn id_of(&self, category: StatusCategory) -> DomainResult<StatusId> {
        self.ids.get(&category).copied().ok_or_else(|| {
            DomainError::configuration(format!(
                "status {category} is not configured for process '{}'",
                self.process
            ))
        })
    }

    /// Status id of a lifecycle stage within this process.
    pub fn id_for(&self, stage: Stage) -> DomainResult<StatusId> {
        let category = stage.category(self.process).ok_or_else(|| {
            DomainError::invariant(format!(
                "stage {stage:?} does not exist in process '{}'",
                self.process
            ))
        })?;
        self.id_of(category)
    }
}
