use std::sync::Arc;

use serde::{Deserialize, Serialize};

use depotflow_core::CompanyId;

use crate::process::Process;

/// One configured approval level of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub company_id: CompanyId,
    pub process: Process,
    /// 1-based approval level.
    pub level: u32,
    /// Role that must act on documents waiting at this level.
    pub approver_role: String,
}

/// Read-only lookup of the configured approval chain.
///
/// Absence of configuration is a valid answer: level 1 missing means the
/// process needs no approval, level `n + 1` missing means level `n` is final.
pub trait WorkflowResolver: Send + Sync {
    fn resolve(&self, company_id: CompanyId, process: Process, level: u32)
    -> Option<WorkflowConfig>;

    fn first_level(&self, company_id: CompanyId, process: Process) -> Option<WorkflowConfig> {
        self.resolve(company_id, process, 1)
    }
}

impl<R> WorkflowResolver for Arc<R>
where
    R: WorkflowResolver + ?Sized,
{
    fn resolve(
        &self,
        company_id: CompanyId,
        process: Process,
        level: u32,
    ) -> Option<WorkflowConfig> {
        (**self).resolve(company_id, process, level)
    }
}
