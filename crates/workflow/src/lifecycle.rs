//! Generic approvable-document state machine.
//!
//! ```text
//! Created ──submit──► ApprovalPending ──approve (last level)──► ApproverCompleted
//!    ▲   └─submit, no workflow──────────────────────────────────────►┘   │
//!    └──────reject──────────┘  │                                         ├─issue─► Issued ─► {PartiallyReceived | Received}
//!                              └──────────cancel──► Cancelled ◄──cancel──┘
//! ```
//!
//! Purchase orders use the whole chart. Return requests stop at
//! `ApproverCompleted` and may re-enter approval through a resubmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depotflow_core::{DomainError, DomainResult, UserId};

use crate::config::WorkflowConfig;
use crate::process::Process;
use crate::status::StatusCategory;
use crate::trail::{ApprovalStep, ApprovalTrail, StepDraft, TrailState};

/// Lifecycle stage of an approvable document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    ApprovalPending,
    ApproverCompleted,
    Issued,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl Stage {
    /// Status catalog category of this stage within `process`.
    pub fn category(self, process: Process) -> Option<StatusCategory> {
        match (process, self) {
            (Process::PurchaseOrder, Stage::Created) => Some(StatusCategory::OrderCreated),
            (Process::PurchaseReturn, Stage::Created) => Some(StatusCategory::ReturnCreated),
            (_, Stage::ApprovalPending) => Some(StatusCategory::ApprovalPending),
            (_, Stage::ApproverCompleted) => Some(StatusCategory::ApproverCompleted),
            (Process::PurchaseOrder, Stage::Issued) => Some(StatusCategory::OrderIssued),
            (Process::PurchaseOrder, Stage::PartiallyReceived) => {
                Some(StatusCategory::PartiallyReceived)
            }
            (Process::PurchaseOrder, Stage::Received) => Some(StatusCategory::Received),
            (Process::PurchaseOrder, Stage::Cancelled) => Some(StatusCategory::Cancelled),
            (Process::PurchaseReturn, _) => None,
        }
    }

    pub fn can_transition_to(self, target: Stage) -> bool {
        use Stage::*;

        match (self, target) {
            (Created, Created | ApprovalPending | ApproverCompleted) => true,
            (ApprovalPending, ApprovalPending | ApproverCompleted | Created | Cancelled) => true,
            // Issue, cancel, or re-enter approval on a resubmitted return.
            (ApproverCompleted, Issued | Cancelled | ApprovalPending | ApproverCompleted) => true,
            (Issued, PartiallyReceived | Received) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Received | Stage::PartiallyReceived | Stage::Cancelled)
    }
}

/// A decided stage change, plus the approval step it appends (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
    pub step: Option<ApprovalStep>,
}

/// Who did something, and when.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub by: UserId,
    pub on: DateTime<Utc>,
}

/// Approval state embedded in every approvable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    stage: Stage,
    workflow: Option<WorkflowConfig>,
    trail: ApprovalTrail,
}

impl Default for Approval {
    fn default() -> Self {
        Self {
            stage: Stage::Created,
            workflow: None,
            trail: ApprovalTrail::new(),
        }
    }
}

impl Approval {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Level-1 workflow the document was routed with, if any.
    pub fn workflow(&self) -> Option<&WorkflowConfig> {
        self.workflow.as_ref()
    }

    pub fn trail(&self) -> &ApprovalTrail {
        &self.trail
    }

    /// Decide the entry transition of a new document.
    ///
    /// With `submit == false` the document stays `Created` (draft).
    pub fn plan_open(
        first_level: Option<&WorkflowConfig>,
        submit: bool,
        stamp: Stamp,
    ) -> Transition {
        let fresh = Approval::default();
        if !submit {
            return Transition {
                from: Stage::Created,
                to: Stage::Created,
                step: None,
            };
        }
        fresh.enter_approval(first_level, "Pending Approval", stamp, None)
    }

    /// `Created -> ApprovalPending | ApproverCompleted`.
    pub fn plan_submit(
        &self,
        first_level: Option<&WorkflowConfig>,
        stamp: Stamp,
    ) -> DomainResult<Transition> {
        match self.stage {
            Stage::Created => Ok(self.enter_approval(first_level, "Pending Approval", stamp, None)),
            Stage::Cancelled => Err(DomainError::conflict("document is cancelled")),
            other => Err(DomainError::conflict(format!(
                "cannot submit a document in stage {other:?}"
            ))),
        }
    }

    /// Re-enter approval from `Created`, `ApprovalPending` or
    /// `ApproverCompleted`, appending a fresh step instead of restarting the
    /// trail.
    pub fn plan_resubmit(
        &self,
        first_level: Option<&WorkflowConfig>,
        stamp: Stamp,
        comment: Option<String>,
    ) -> DomainResult<Transition> {
        match self.stage {
            Stage::Created | Stage::ApprovalPending | Stage::ApproverCompleted => {
                Ok(self.enter_approval(first_level, "Resubmitted", stamp, comment))
            }
            Stage::Cancelled => Err(DomainError::conflict("document is cancelled")),
            other => Err(DomainError::conflict(format!(
                "cannot resubmit a document in stage {other:?}"
            ))),
        }
    }

    /// Approve the pending level.
    ///
    /// `next_level` is the configuration for `pending.level + 1`; when it is
    /// absent the step finalizes the workflow.
    pub fn plan_approve(
        &self,
        acting_role: &str,
        next_level: Option<&WorkflowConfig>,
        stamp: Stamp,
        comment: Option<String>,
    ) -> DomainResult<Transition> {
        let pending = self.pending_for(acting_role)?;

        let (draft, to) = match next_level {
            Some(next) => {
                if next.level != pending.level + 1 {
                    return Err(DomainError::invariant(format!(
                        "next workflow level must be {}, got {}",
                        pending.level + 1,
                        next.level
                    )));
                }
                (
                    StepDraft {
                        status_label: "Approved".to_string(),
                        trail_state: TrailState::Pending,
                        level: next.level,
                        approver_role: next.approver_role.clone(),
                        recorded_at: stamp.on,
                        recorded_by: Some(stamp.by),
                        comment,
                    },
                    Stage::ApprovalPending,
                )
            }
            None => (
                StepDraft {
                    status_label: "Approved".to_string(),
                    trail_state: TrailState::Finalized,
                    level: pending.level,
                    approver_role: pending.approver_role.clone(),
                    recorded_at: stamp.on,
                    recorded_by: Some(stamp.by),
                    comment,
                },
                Stage::ApproverCompleted,
            ),
        };

        Ok(Transition {
            from: self.stage,
            to,
            step: Some(self.trail.stamp(draft)),
        })
    }

    /// Send a pending document back to its author (`ApprovalPending -> Created`).
    pub fn plan_reject(
        &self,
        acting_role: &str,
        stamp: Stamp,
        comment: &str,
    ) -> DomainResult<Transition> {
        let pending = self.pending_for(acting_role)?;
        if comment.trim().is_empty() {
            return Err(DomainError::validation(
                "comment",
                "a comment is required when sending a document back",
            ));
        }

        let step = self.trail.stamp(StepDraft {
            status_label: "Sent Back".to_string(),
            trail_state: TrailState::SentBack,
            level: pending.level,
            approver_role: pending.approver_role.clone(),
            recorded_at: stamp.on,
            recorded_by: Some(stamp.by),
            comment: Some(comment.to_string()),
        });

        Ok(Transition {
            from: self.stage,
            to: Stage::Created,
            step: Some(step),
        })
    }

    /// `ApprovalPending | ApproverCompleted -> Cancelled`.
    pub fn plan_cancel(&self) -> DomainResult<Transition> {
        match self.stage {
            Stage::ApprovalPending | Stage::ApproverCompleted => Ok(Transition {
                from: self.stage,
                to: Stage::Cancelled,
                step: None,
            }),
            Stage::Cancelled => Err(DomainError::conflict("document is already cancelled")),
            other => Err(DomainError::conflict(format!(
                "cannot cancel a document in stage {other:?}"
            ))),
        }
    }

    /// Record the workflow a document was routed with.
    pub fn route(&mut self, workflow: Option<WorkflowConfig>) {
        self.workflow = workflow;
    }

    /// Apply a decided transition.
    pub fn apply(&mut self, transition: &Transition) {
        debug_assert!(transition.from.can_transition_to(transition.to));
        self.stage = transition.to;
        if let Some(step) = &transition.step {
            self.trail.append(step.clone());
        }
    }

    /// Move to a post-approval stage (issue, receive).
    pub fn enter(&mut self, stage: Stage) {
        debug_assert!(self.stage.can_transition_to(stage));
        self.stage = stage;
    }

    fn pending_for(&self, acting_role: &str) -> DomainResult<&ApprovalStep> {
        match self.stage {
            Stage::ApprovalPending => {}
            Stage::ApproverCompleted => {
                return Err(DomainError::conflict("approval is already finalized"));
            }
            Stage::Cancelled => return Err(DomainError::conflict("document is cancelled")),
            other => {
                return Err(DomainError::conflict(format!(
                    "document in stage {other:?} is not awaiting approval"
                )));
            }
        }

        let pending = self
            .trail
            .pending_step()
            .ok_or_else(|| DomainError::invariant("pending document has no pending step"))?;

        if pending.approver_role != acting_role {
            return Err(DomainError::validation(
                "approver_role",
                format!(
                    "level {} must be approved by '{}', not '{}'",
                    pending.level, pending.approver_role, acting_role
                ),
            ));
        }
        Ok(pending)
    }

    fn enter_approval(
        &self,
        first_level: Option<&WorkflowConfig>,
        label: &str,
        stamp: Stamp,
        comment: Option<String>,
    ) -> Transition {
        match first_level {
            Some(cfg) => Transition {
                from: self.stage,
                to: Stage::ApprovalPending,
                step: Some(self.trail.stamp(StepDraft {
                    status_label: label.to_string(),
                    trail_state: TrailState::Pending,
                    level: cfg.level,
                    approver_role: cfg.approver_role.clone(),
                    recorded_at: stamp.on,
                    recorded_by: Some(stamp.by),
                    comment,
                })),
            },
            // No workflow configured: approval is intentionally bypassed.
            None => Transition {
                from: self.stage,
                to: Stage::ApproverCompleted,
                step: None,
            },
        }
    }
}
