//! Append-only approval trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depotflow_core::UserId;

/// Where the trail stands after a step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailState {
    /// Waiting for the approver role of `level`.
    Pending,
    /// Sent back to the author for changes.
    SentBack,
    /// The last configured level approved the document.
    Finalized,
}

/// One entry in an approval trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Position in the trail, starting at 0.
    pub sequence_no: u32,
    pub status_label: String,
    pub trail_state: TrailState,
    pub level: u32,
    pub approver_role: String,
    pub is_finalized: bool,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: Option<UserId>,
    pub comment: Option<String>,
}

/// A step before it is stamped with its position in a trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDraft {
    pub status_label: String,
    pub trail_state: TrailState,
    pub level: u32,
    pub approver_role: String,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: Option<UserId>,
    pub comment: Option<String>,
}

/// Ordered, append-only log of approval steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalTrail {
    steps: Vec<ApprovalStep>,
}

impl ApprovalTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sequence number the next appended step will get.
    pub fn next_sequence(&self) -> u32 {
        self.steps.len() as u32
    }

    /// The trailing step (highest sequence number).
    pub fn latest(&self) -> Option<&ApprovalStep> {
        self.steps.last()
    }

    /// The trailing step, if it is waiting for an approver.
    pub fn pending_step(&self) -> Option<&ApprovalStep> {
        self.latest().filter(|s| s.trail_state == TrailState::Pending)
    }

    /// The trailing step, if it finalized the workflow.
    pub fn finalized_step(&self) -> Option<&ApprovalStep> {
        self.latest().filter(|s| s.is_finalized)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_step().is_some()
    }

    /// Turn a draft into the step that would be appended next.
    pub fn stamp(&self, draft: StepDraft) -> ApprovalStep {
        ApprovalStep {
            sequence_no: self.next_sequence(),
            is_finalized: draft.trail_state == TrailState::Finalized,
            status_label: draft.status_label,
            trail_state: draft.trail_state,
            level: draft.level,
            approver_role: draft.approver_role,
            recorded_at: draft.recorded_at,
            recorded_by: draft.recorded_by,
            comment: draft.comment,
        }
    }

    /// Append a step previously produced by [`stamp`](Self::stamp).
    pub fn append(&mut self, step: ApprovalStep) {
        debug_assert_eq!(step.sequence_no, self.next_sequence());
        self.steps.push(step);
    }
}
