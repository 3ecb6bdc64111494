use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use depotflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DocumentNumber, DomainError, DomainResult,
    ItemId, NumberPrefix, StatusId, UserId,
};
use depotflow_events::Event;
use depotflow_purchasing::{PurchaseOrderId, SupplierRef};
use depotflow_workflow::{
    Approval, ApprovalTrail, Process, ProcessStatuses, Stage, Stamp, Transition, WorkflowConfig,
};

use crate::reconcile::{OrderReturnables, ReturnLine, validate_return};

/// Return request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnRequestId(pub AggregateId);

impl ReturnRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReturnRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Metadata of a supporting document; the file itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

/// Return request line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequestItem {
    pub item_id: ItemId,
    pub returned_qty: u32,
    /// Frozen unit price of the source order line.
    pub unit_price: i64,
    pub reason: String,
}

impl ReturnRequestItem {
    pub fn line_value(&self) -> i64 {
        i64::from(self.returned_qty) * self.unit_price
    }
}

/// Aggregate root: ReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    id: ReturnRequestId,
    company_id: Option<CompanyId>,
    number: Option<DocumentNumber>,
    order_id: Option<PurchaseOrderId>,
    supplier: Option<SupplierRef>,
    status: Option<StatusId>,
    approval: Approval,
    return_date: Option<NaiveDate>,
    total_qty: u64,
    total_value: i64,
    remark: Option<String>,
    attachment: Option<AttachmentMeta>,
    lines: Vec<ReturnRequestItem>,
    /// Whether the current lines have been taken out of inventory.
    inventory_applied: bool,
    version: u64,
    created: bool,
}

impl ReturnRequest {
    pub fn empty(id: ReturnRequestId) -> Self {
        Self {
            id,
            company_id: None,
            number: None,
            order_id: None,
            supplier: None,
            status: None,
            approval: Approval::default(),
            return_date: None,
            total_qty: 0,
            total_value: 0,
            remark: None,
            attachment: None,
            lines: Vec::new(),
            inventory_applied: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReturnRequestId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn order_id(&self) -> Option<PurchaseOrderId> {
        self.order_id
    }

    pub fn supplier(&self) -> Option<&SupplierRef> {
        self.supplier.as_ref()
    }

    pub fn status(&self) -> Option<StatusId> {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.approval.stage()
    }

    pub fn trail(&self) -> &ApprovalTrail {
        self.approval.trail()
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn total_qty(&self) -> u64 {
        self.total_qty
    }

    pub fn total_value(&self) -> i64 {
        self.total_value
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn attachment(&self) -> Option<&AttachmentMeta> {
        self.attachment.as_ref()
    }

    pub fn lines(&self) -> &[ReturnRequestItem] {
        &self.lines
    }

    pub fn inventory_applied(&self) -> bool {
        self.inventory_applied
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    fn set_lines(&mut self, lines: &[ReturnRequestItem]) {
        self.total_qty = lines.iter().map(|l| u64::from(l.returned_qty)).sum();
        self.total_value = lines.iter().map(ReturnRequestItem::line_value).sum();
        self.lines = lines.to_vec();
    }
}

impl AggregateRoot for ReturnRequest {
    type Id = ReturnRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReturnRequest {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub number: DocumentNumber,
    pub return_date: NaiveDate,
    pub order: OrderReturnables,
    pub lines: Vec<ReturnLine>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub first_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResubmitReturnRequest (edit and re-enter approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmitReturnRequest {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub order: OrderReturnables,
    pub lines: Vec<ReturnLine>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub first_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub resubmitted_by: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReturnRequest {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub acting_role: String,
    pub next_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub approved_by: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReturnRequest {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub acting_role: String,
    pub statuses: ProcessStatuses,
    pub rejected_by: UserId,
    pub comment: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnRequestCommand {
    CreateReturnRequest(CreateReturnRequest),
    ResubmitReturnRequest(ResubmitReturnRequest),
    ApproveReturnRequest(ApproveReturnRequest),
    RejectReturnRequest(RejectReturnRequest),
}

/// Event: ReturnRequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequestCreated {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub number: DocumentNumber,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub return_date: NaiveDate,
    pub lines: Vec<ReturnRequestItem>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub status: StatusId,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnSubmitted (first entry into approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSubmitted {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub workflow: Option<WorkflowConfig>,
    pub transition: Transition,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnApprovalRequired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnApprovalRequired {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub number: DocumentNumber,
    pub level: u32,
    pub approver_role: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnInventoryReopened.
///
/// An accepted return is being edited: the stock it withdrew goes back on
/// hand before the return re-enters approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnInventoryReopened {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<ReturnRequestItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRequestResubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequestResubmitted {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub number: DocumentNumber,
    pub lines: Vec<ReturnRequestItem>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub workflow: Option<WorkflowConfig>,
    pub transition: Transition,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequestApproved {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub transition: Transition,
    pub status: StatusId,
    pub finalized: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequestRejected {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub transition: Transition,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnAccepted.
///
/// Approval is complete; the engine withdraws `lines` from the inventory
/// records of the order in the same changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnAccepted {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<ReturnRequestItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnRequestEvent {
    ReturnRequestCreated(ReturnRequestCreated),
    ReturnSubmitted(ReturnSubmitted),
    ReturnApprovalRequired(ReturnApprovalRequired),
    ReturnInventoryReopened(ReturnInventoryReopened),
    ReturnRequestResubmitted(ReturnRequestResubmitted),
    ReturnRequestApproved(ReturnRequestApproved),
    ReturnRequestRejected(ReturnRequestRejected),
    ReturnAccepted(ReturnAccepted),
}

impl Event for ReturnRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnRequestEvent::ReturnRequestCreated(_) => "returns.request.created",
            ReturnRequestEvent::ReturnSubmitted(_) => "returns.request.submitted",
            ReturnRequestEvent::ReturnApprovalRequired(_) => "returns.request.approval_required",
            ReturnRequestEvent::ReturnInventoryReopened(_) => "returns.request.inventory_reopened",
            ReturnRequestEvent::ReturnRequestResubmitted(_) => "returns.request.resubmitted",
            ReturnRequestEvent::ReturnRequestApproved(_) => "returns.request.approved",
            ReturnRequestEvent::ReturnRequestRejected(_) => "returns.request.rejected",
            ReturnRequestEvent::ReturnAccepted(_) => "returns.request.accepted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnRequestEvent::ReturnRequestCreated(e) => e.occurred_at,
            ReturnRequestEvent::ReturnSubmitted(e) => e.occurred_at,
            ReturnRequestEvent::ReturnApprovalRequired(e) => e.occurred_at,
            ReturnRequestEvent::ReturnInventoryReopened(e) => e.occurred_at,
            ReturnRequestEvent::ReturnRequestResubmitted(e) => e.occurred_at,
            ReturnRequestEvent::ReturnRequestApproved(e) => e.occurred_at,
            ReturnRequestEvent::ReturnRequestRejected(e) => e.occurred_at,
            ReturnRequestEvent::ReturnAccepted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReturnRequest {
    type Command = ReturnRequestCommand;
    type Event = ReturnRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnRequestEvent::ReturnRequestCreated(e) => {
                self.id = e.return_id;
                self.company_id = Some(e.company_id);
                self.number = Some(e.number.clone());
                self.order_id = Some(e.order_id);
                self.supplier = Some(e.supplier.clone());
                self.return_date = Some(e.return_date);
                self.remark = e.remark.clone();
                self.attachment = e.attachment.clone();
                self.status = Some(e.status);
                self.approval = Approval::default();
                self.set_lines(&e.lines);
                self.created = true;
            }
            ReturnRequestEvent::ReturnSubmitted(e) => {
                self.approval.route(e.workflow.clone());
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            ReturnRequestEvent::ReturnApprovalRequired(_) => {}
            ReturnRequestEvent::ReturnInventoryReopened(_) => {
                self.inventory_applied = false;
            }
            ReturnRequestEvent::ReturnRequestResubmitted(e) => {
                self.set_lines(&e.lines);
                self.remark = e.remark.clone();
                self.attachment = e.attachment.clone();
                self.approval.route(e.workflow.clone());
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            ReturnRequestEvent::ReturnRequestApproved(e) => {
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            ReturnRequestEvent::ReturnRequestRejected(e) => {
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            ReturnRequestEvent::ReturnAccepted(_) => {
                self.inventory_applied = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnRequestCommand::CreateReturnRequest(cmd) => self.handle_create(cmd),
            ReturnRequestCommand::ResubmitReturnRequest(cmd) => self.handle_resubmit(cmd),
            ReturnRequestCommand::ApproveReturnRequest(cmd) => self.handle_approve(cmd),
            ReturnRequestCommand::RejectReturnRequest(cmd) => self.handle_reject(cmd),
        }
    }
}

impl ReturnRequest {
    fn ensure_company(&self, company_id: CompanyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.company_id != Some(company_id) {
            return Err(DomainError::invariant("company mismatch"));
        }
        Ok(())
    }

    fn ensure_return_id(&self, return_id: ReturnRequestId) -> Result<(), DomainError> {
        if self.id != return_id {
            return Err(DomainError::invariant("return_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, company_id: CompanyId, return_id: ReturnRequestId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company(company_id)?;
        self.ensure_return_id(return_id)
    }

    fn ensure_statuses(statuses: &ProcessStatuses) -> DomainResult<()> {
        if statuses.process() != Process::PurchaseReturn {
            return Err(DomainError::invariant(format!(
                "expected purchase return statuses, got '{}'",
                statuses.process()
            )));
        }
        Ok(())
    }

    fn ensure_same_order(&self, order: &OrderReturnables) -> DomainResult<()> {
        if self.order_id != Some(order.order_id) {
            return Err(DomainError::invariant(
                "returnables snapshot belongs to another order",
            ));
        }
        Ok(())
    }

    fn number_or_invariant(&self) -> DomainResult<DocumentNumber> {
        self.number
            .clone()
            .ok_or_else(|| DomainError::invariant("return request has no number"))
    }

    fn order_or_invariant(&self) -> DomainResult<PurchaseOrderId> {
        self.order_id
            .ok_or_else(|| DomainError::invariant("return request has no order"))
    }

    /// Follow-up events of a transition: the approval notification when it
    /// leaves a pending step, the acceptance when it completes approval.
    fn after_transition(
        company_id: CompanyId,
        return_id: ReturnRequestId,
        order_id: PurchaseOrderId,
        number: &DocumentNumber,
        transition: &Transition,
        lines: &[ReturnRequestItem],
        occurred_at: DateTime<Utc>,
    ) -> Option<ReturnRequestEvent> {
        match transition.to {
            Stage::ApprovalPending => {
                let step = transition.step.as_ref()?;
                Some(ReturnRequestEvent::ReturnApprovalRequired(
                    ReturnApprovalRequired {
                        company_id,
                        return_id,
                        number: number.clone(),
                        level: step.level,
                        approver_role: step.approver_role.clone(),
                        occurred_at,
                    },
                ))
            }
            Stage::ApproverCompleted => Some(ReturnRequestEvent::ReturnAccepted(ReturnAccepted {
                company_id,
                return_id,
                order_id,
                lines: lines.to_vec(),
                occurred_at,
            })),
            _ => None,
        }
    }

    fn handle_create(
        &self,
        cmd: &CreateReturnRequest,
    ) -> Result<Vec<ReturnRequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return request already exists"));
        }
        self.ensure_return_id(cmd.return_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        if cmd.number.prefix() != NumberPrefix::Return {
            return Err(DomainError::invariant(format!(
                "return number {} must use prefix {}",
                cmd.number,
                NumberPrefix::Return
            )));
        }
        if cmd.number.supplier_code() != cmd.order.supplier.code {
            return Err(DomainError::invariant(format!(
                "return number {} does not belong to supplier {}",
                cmd.number, cmd.order.supplier.code
            )));
        }
        cmd.order.ensure_received()?;
        let lines = validate_return(&cmd.order, &cmd.lines, &[])?;

        let mut events = vec![ReturnRequestEvent::ReturnRequestCreated(
            ReturnRequestCreated {
                company_id: cmd.company_id,
                return_id: cmd.return_id,
                number: cmd.number.clone(),
                order_id: cmd.order.order_id,
                supplier: cmd.order.supplier.clone(),
                return_date: cmd.return_date,
                lines: lines.clone(),
                remark: cmd.remark.clone(),
                attachment: cmd.attachment.clone(),
                status: cmd.statuses.id_for(Stage::Created)?,
                created_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            },
        )];

        let transition = Approval::plan_open(
            cmd.first_level.as_ref(),
            true,
            Stamp {
                by: cmd.created_by,
                on: cmd.occurred_at,
            },
        );
        events.push(ReturnRequestEvent::ReturnSubmitted(ReturnSubmitted {
            company_id: cmd.company_id,
            return_id: cmd.return_id,
            workflow: cmd.first_level.clone(),
            status: cmd.statuses.id_for(transition.to)?,
            transition: transition.clone(),
            occurred_at: cmd.occurred_at,
        }));
        events.extend(Self::after_transition(
            cmd.company_id,
            cmd.return_id,
            cmd.order.order_id,
            &cmd.number,
            &transition,
            &lines,
            cmd.occurred_at,
        ));
        Ok(events)
    }

    fn handle_resubmit(
        &self,
        cmd: &ResubmitReturnRequest,
    ) -> Result<Vec<ReturnRequestEvent>, DomainError> {
        self.ensure_existing(cmd.company_id, cmd.return_id)?;
        Self::ensure_statuses(&cmd.statuses)?;
        self.ensure_same_order(&cmd.order)?;

        let transition = self.approval.plan_resubmit(
            cmd.first_level.as_ref(),
            Stamp {
                by: cmd.resubmitted_by,
                on: cmd.occurred_at,
            },
            cmd.comment.clone(),
        )?;
        // The edited lines replace this return's own lines, so they are
        // checked with those excluded from the already-returned totals.
        let lines = validate_return(&cmd.order, &cmd.lines, &self.lines)?;
        let number = self.number_or_invariant()?;
        let order_id = self.order_or_invariant()?;

        let mut events = Vec::new();
        if self.inventory_applied {
            events.push(ReturnRequestEvent::ReturnInventoryReopened(
                ReturnInventoryReopened {
                    company_id: cmd.company_id,
                    return_id: cmd.return_id,
                    order_id,
                    lines: self.lines.clone(),
                    occurred_at: cmd.occurred_at,
                },
            ));
        }
        events.push(ReturnRequestEvent::ReturnRequestResubmitted(
            ReturnRequestResubmitted {
                company_id: cmd.company_id,
                return_id: cmd.return_id,
                number: number.clone(),
                lines: lines.clone(),
                remark: cmd.remark.clone(),
                attachment: cmd.attachment.clone(),
                workflow: cmd.first_level.clone(),
                status: cmd.statuses.id_for(transition.to)?,
                transition: transition.clone(),
                occurred_at: cmd.occurred_at,
            },
        ));
        events.extend(Self::after_transition(
            cmd.company_id,
            cmd.return_id,
            order_id,
            &number,
            &transition,
            &lines,
            cmd.occurred_at,
        ));
        Ok(events)
    }

    fn handle_approve(
        &self,
        cmd: &ApproveReturnRequest,
    ) -> Result<Vec<ReturnRequestEvent>, DomainError> {
        self.ensure_existing(cmd.company_id, cmd.return_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let transition = self.approval.plan_approve(
            &cmd.acting_role,
            cmd.next_level.as_ref(),
            Stamp {
                by: cmd.approved_by,
                on: cmd.occurred_at,
            },
            cmd.comment.clone(),
        )?;
        let finalized = transition.step.as_ref().is_some_and(|s| s.is_finalized);

        let mut events = vec![ReturnRequestEvent::ReturnRequestApproved(
            ReturnRequestApproved {
                company_id: cmd.company_id,
                return_id: cmd.return_id,
                status: cmd.statuses.id_for(transition.to)?,
                transition: transition.clone(),
                finalized,
                occurred_at: cmd.occurred_at,
            },
        )];
        events.extend(Self::after_transition(
            cmd.company_id,
            cmd.return_id,
            self.order_or_invariant()?,
            &self.number_or_invariant()?,
            &transition,
            &self.lines,
            cmd.occurred_at,
        ));
        Ok(events)
    }

    fn handle_reject(
        &self,
        cmd: &RejectReturnRequest,
    ) -> Result<Vec<ReturnRequestEvent>, DomainError> {
        self.ensure_existing(cmd.company_id, cmd.return_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let transition = self.approval.plan_reject(
            &cmd.acting_role,
            Stamp {
                by: cmd.rejected_by,
                on: cmd.occurred_at,
            },
            &cmd.comment,
        )?;

        Ok(vec![ReturnRequestEvent::ReturnRequestRejected(
            ReturnRequestRejected {
                company_id: cmd.company_id,
                return_id: cmd.return_id,
                status: cmd.statuses.id_for(transition.to)?,
                transition,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ReturnableLine;
    use depotflow_core::SupplierId;
    use depotflow_events::execute;
    use depotflow_workflow::StatusCategory;

    fn test_statuses() -> ProcessStatuses {
        ProcessStatuses::new(
            Process::PurchaseReturn,
            Process::PurchaseReturn
                .required_categories()
                .iter()
                .map(|c| (*c, StatusId::new())),
        )
        .unwrap()
    }

    struct Fixture {
        company_id: CompanyId,
        item_id: ItemId,
        statuses: ProcessStatuses,
        order: OrderReturnables,
        request: ReturnRequest,
    }

    impl Fixture {
        fn new(received: u32, already: u32) -> Self {
            let item_id = ItemId::new();
            Self {
                company_id: CompanyId::new(),
                item_id,
                statuses: test_statuses(),
                order: OrderReturnables {
                    order_id: PurchaseOrderId::new(AggregateId::new()),
                    supplier: SupplierRef {
                        id: SupplierId::new(),
                        code: "ACME".to_string(),
                    },
                    order_stage: Stage::Received,
                    lines: vec![ReturnableLine {
                        item_id,
                        received_qty: received,
                        already_returned: already,
                        unit_price: 1_500,
                    }],
                },
                request: ReturnRequest::empty(ReturnRequestId::new(AggregateId::new())),
            }
        }

        fn line(&self, qty: i64) -> ReturnLine {
            ReturnLine {
                item_id: self.item_id,
                returned_qty: qty,
                reason: Some("wrong size".to_string()),
            }
        }

        fn create(
            &mut self,
            qty: i64,
            first_level: Option<WorkflowConfig>,
        ) -> DomainResult<Vec<ReturnRequestEvent>> {
            let today = Utc::now().date_naive();
            let cmd = ReturnRequestCommand::CreateReturnRequest(CreateReturnRequest {
                company_id: self.company_id,
                return_id: self.request.id_typed(),
                number: DocumentNumber::new(NumberPrefix::Return, "ACME", today, 1).unwrap(),
                return_date: today,
                order: self.order.clone(),
                lines: vec![self.line(qty)],
                remark: Some("box crushed".to_string()),
                attachment: None,
                first_level,
                statuses: self.statuses.clone(),
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            });
            execute(&mut self.request, &cmd)
        }

        fn resubmit(
            &mut self,
            qty: i64,
            first_level: Option<WorkflowConfig>,
        ) -> DomainResult<Vec<ReturnRequestEvent>> {
            let cmd = ReturnRequestCommand::ResubmitReturnRequest(ResubmitReturnRequest {
                company_id: self.company_id,
                return_id: self.request.id_typed(),
                order: self.order.clone(),
                lines: vec![self.line(qty)],
                remark: None,
                attachment: None,
                first_level,
                statuses: self.statuses.clone(),
                resubmitted_by: UserId::new(),
                comment: Some("quantity corrected".to_string()),
                occurred_at: Utc::now(),
            });
            execute(&mut self.request, &cmd)
        }

        fn level_one(&self) -> WorkflowConfig {
            WorkflowConfig {
                company_id: self.company_id,
                process: Process::PurchaseReturn,
                level: 1,
                approver_role: "store_manager".to_string(),
            }
        }

        /// Mirror what the store sees after this return's lines are recorded.
        fn count_own_lines(&mut self) {
            let own: u32 = self.request.lines().iter().map(|l| l.returned_qty).sum();
            self.order.lines[0].already_returned += own;
        }
    }

    #[test]
    fn return_without_workflow_is_accepted_immediately() {
        let mut fx = Fixture::new(10, 0);
        let events = fx.create(4, None).unwrap();

        assert_eq!(fx.request.stage(), Stage::ApproverCompleted);
        assert!(fx.request.inventory_applied());
        assert_eq!(fx.request.total_qty(), 4);
        assert_eq!(fx.request.total_value(), 4 * 1_500);
        assert_eq!(
            fx.request.status(),
            Some(fx.statuses.id_of(StatusCategory::ApproverCompleted).unwrap())
        );
        assert_eq!(
            events.last().map(Event::event_type),
            Some("returns.request.accepted")
        );
    }

    #[test]
    fn workflow_return_is_accepted_on_final_approval() {
        let mut fx = Fixture::new(10, 0);
        let l1 = fx.level_one();
        fx.create(4, Some(l1)).unwrap();
        assert_eq!(fx.request.stage(), Stage::ApprovalPending);
        assert!(!fx.request.inventory_applied());
        assert_eq!(
            fx.request.status(),
            Some(fx.statuses.id_of(StatusCategory::ApprovalPending).unwrap())
        );

        let return_id = fx.request.id_typed();
        let events = execute(
            &mut fx.request,
            &ReturnRequestCommand::ApproveReturnRequest(ApproveReturnRequest {
                company_id: fx.company_id,
                return_id,
                acting_role: "store_manager".to_string(),
                next_level: None,
                statuses: fx.statuses.clone(),
                approved_by: UserId::new(),
                comment: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(matches!(events.last(), Some(ReturnRequestEvent::ReturnAccepted(_))));
        assert!(fx.request.inventory_applied());
        assert!(fx.request.trail().is_finalized());
    }

    #[test]
    fn return_against_unreceived_order_is_a_conflict() {
        let mut fx = Fixture::new(10, 0);
        fx.order.order_stage = Stage::Issued;
        assert!(matches!(fx.create(1, None), Err(DomainError::Conflict(_))));
        assert!(!fx.request.is_created());
    }

    #[test]
    fn over_return_is_rejected_with_field_message() {
        let mut fx = Fixture::new(10, 3);
        let err = fx.create(8, None).unwrap_err();
        assert_eq!(err.violations()[0].field, "lines[0].returned_qty");
        fx.create(7, None).unwrap();
    }

    #[test]
    fn unchanged_resubmit_validates_when_everything_is_returned() {
        let mut fx = Fixture::new(10, 6);
        let l1 = fx.level_one();
        fx.create(4, Some(l1.clone())).unwrap();
        fx.count_own_lines();
        assert_eq!(fx.order.lines[0].already_returned, 10);

        let events = fx.resubmit(4, Some(l1)).unwrap();
        assert!(matches!(
            events[0],
            ReturnRequestEvent::ReturnRequestResubmitted(_)
        ));
        assert_eq!(fx.request.stage(), Stage::ApprovalPending);
        assert_eq!(fx.request.trail().len(), 2);
        assert_eq!(fx.request.trail().latest().unwrap().sequence_no, 1);

        assert!(fx.resubmit(5, None).is_err());
    }

    #[test]
    fn resubmitting_an_accepted_return_reopens_inventory_first() {
        let mut fx = Fixture::new(10, 0);
        fx.create(3, None).unwrap();
        fx.count_own_lines();
        let l1 = fx.level_one();

        let events = fx.resubmit(5, Some(l1)).unwrap();
        match &events[0] {
            ReturnRequestEvent::ReturnInventoryReopened(e) => {
                assert_eq!(e.lines[0].returned_qty, 3);
            }
            other => panic!("expected inventory reopen, got {other:?}"),
        }
        assert!(!fx.request.inventory_applied());
        assert_eq!(fx.request.lines()[0].returned_qty, 5);
        assert_eq!(fx.request.stage(), Stage::ApprovalPending);
    }

    #[test]
    fn rejected_return_goes_back_to_created() {
        let mut fx = Fixture::new(10, 0);
        let l1 = fx.level_one();
        fx.create(2, Some(l1)).unwrap();

        let return_id = fx.request.id_typed();
        execute(
            &mut fx.request,
            &ReturnRequestCommand::RejectReturnRequest(RejectReturnRequest {
                company_id: fx.company_id,
                return_id,
                acting_role: "store_manager".to_string(),
                statuses: fx.statuses.clone(),
                rejected_by: UserId::new(),
                comment: "attach the delivery note".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(fx.request.stage(), Stage::Created);
        assert_eq!(
            fx.request.status(),
            Some(fx.statuses.id_of(StatusCategory::ReturnCreated).unwrap())
        );
    }
}
