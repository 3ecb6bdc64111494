use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use depotflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DocumentNumber, DomainError, DomainResult,
    FieldViolation, ItemId, NumberPrefix, StatusId, StoreId, SupplierId, UserId,
};
use depotflow_events::Event;
use depotflow_workflow::{
    Approval, ApprovalTrail, Process, ProcessStatuses, Stage, Stamp, Transition, WorkflowConfig,
};

use crate::receiving::{LineReceipt, ReceiptEntry, plan_receipt};

/// Purchase order identifier (company-scoped via `company_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier the order is placed with. The code is part of document numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierRef {
    pub id: SupplierId,
    pub code: String,
}

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub line_no: u32,
    pub item_id: ItemId,
    pub ordered_qty: u32,
    /// Order-time unit price in minor units, frozen at creation.
    pub unit_price: i64,
    /// `None` until the order is received.
    pub received_qty: Option<u32>,
}

impl PurchaseOrderItem {
    /// Quantity still outstanding after receiving.
    pub fn remaining_qty(&self) -> u32 {
        self.ordered_qty - self.received_qty.unwrap_or(0)
    }

    pub fn line_value(&self) -> i64 {
        i64::from(self.ordered_qty) * self.unit_price
    }
}

/// Line as entered on a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_id: ItemId,
    pub ordered_qty: i64,
    pub unit_price: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    SupplierUnavailable,
    PriceChanged,
    NoLongerNeeded,
    DuplicateOrder,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancelReason,
    pub note: Option<String>,
    pub cancelled: Stamp,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    company_id: Option<CompanyId>,
    number: Option<DocumentNumber>,
    order_date: Option<NaiveDate>,
    supplier: Option<SupplierRef>,
    store_id: Option<StoreId>,
    status: Option<StatusId>,
    approval: Approval,
    total_qty: u64,
    total_value: i64,
    issued: Option<Stamp>,
    cancellation: Option<Cancellation>,
    backorder_of: Option<PurchaseOrderId>,
    backorder: Option<PurchaseOrderId>,
    active: bool,
    lines: Vec<PurchaseOrderItem>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate (target of `CreatePurchaseOrder`).
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            company_id: None,
            number: None,
            order_date: None,
            supplier: None,
            store_id: None,
            status: None,
            approval: Approval::default(),
            total_qty: 0,
            total_value: 0,
            issued: None,
            cancellation: None,
            backorder_of: None,
            backorder: None,
            active: false,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn supplier(&self) -> Option<&SupplierRef> {
        self.supplier.as_ref()
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    /// Status catalog id of the current stage.
    pub fn status(&self) -> Option<StatusId> {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.approval.stage()
    }

    pub fn workflow(&self) -> Option<&WorkflowConfig> {
        self.approval.workflow()
    }

    pub fn trail(&self) -> &ApprovalTrail {
        self.approval.trail()
    }

    pub fn total_qty(&self) -> u64 {
        self.total_qty
    }

    pub fn total_value(&self) -> i64 {
        self.total_value
    }

    pub fn issued(&self) -> Option<&Stamp> {
        self.issued.as_ref()
    }

    pub fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    /// Order this one was spawned from.
    pub fn backorder_of(&self) -> Option<PurchaseOrderId> {
        self.backorder_of
    }

    /// Backorder spawned from this order.
    pub fn backorder(&self) -> Option<PurchaseOrderId> {
        self.backorder
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn lines(&self) -> &[PurchaseOrderItem] {
        &self.lines
    }

    pub fn line_for_item(&self, item_id: ItemId) -> Option<&PurchaseOrderItem> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Total quantity of `item_id` received against this order.
    pub fn received_qty_of(&self, item_id: ItemId) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.item_id == item_id)
            .map(|l| l.received_qty.unwrap_or(0))
            .sum()
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
///
/// `first_level` and `statuses` are resolved by the caller; with `submit ==
/// false` the order is saved as a draft in `Created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub order_date: NaiveDate,
    pub supplier: SupplierRef,
    pub store_id: StoreId,
    pub lines: Vec<NewLine>,
    pub backorder_of: Option<PurchaseOrderId>,
    pub submit: bool,
    pub first_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitPurchaseOrder (draft enters approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub first_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApprovePurchaseOrder (the pending level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub acting_role: String,
    /// Configuration of the level after the pending one, if any.
    pub next_level: Option<WorkflowConfig>,
    pub statuses: ProcessStatuses,
    pub approved_by: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectPurchaseOrder (send back to the author).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectPurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub acting_role: String,
    pub statuses: ProcessStatuses,
    pub rejected_by: UserId,
    pub comment: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssuePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub statuses: ProcessStatuses,
    pub issued_by: UserId,
    pub notify_supplier: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub entries: Vec<ReceiptEntry>,
    pub statuses: ProcessStatuses,
    pub received_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkBackorder (record the spawned backorder on its source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBackorder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub backorder_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub reason: CancelReason,
    pub note: Option<String>,
    pub statuses: ProcessStatuses,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivatePurchaseOrder (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivatePurchaseOrder {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub deactivated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    SubmitPurchaseOrder(SubmitPurchaseOrder),
    ApprovePurchaseOrder(ApprovePurchaseOrder),
    RejectPurchaseOrder(RejectPurchaseOrder),
    IssuePurchaseOrder(IssuePurchaseOrder),
    ReceiveGoods(ReceiveGoods),
    LinkBackorder(LinkBackorder),
    CancelPurchaseOrder(CancelPurchaseOrder),
    DeactivatePurchaseOrder(DeactivatePurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub order_date: NaiveDate,
    pub supplier: SupplierRef,
    pub store_id: StoreId,
    pub lines: Vec<PurchaseOrderItem>,
    pub backorder_of: Option<PurchaseOrderId>,
    pub status: StatusId,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted (entered approval, or skipped it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub workflow: Option<WorkflowConfig>,
    pub transition: Transition,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalRequired.
///
/// Notification only; the pending step itself travels in the transition of
/// the event emitted just before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequired {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub level: u32,
    pub approver_role: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub transition: Transition,
    pub status: StatusId,
    pub finalized: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRejected {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub transition: Transition,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderIssued {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub supplier: SupplierRef,
    pub status: StatusId,
    pub issued: Stamp,
    /// Whether the supplier should be e-mailed about the order.
    pub notify_supplier: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries every line's received quantity; the engine turns the positive
/// ones into inventory records in the same changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub store_id: StoreId,
    pub receipts: Vec<LineReceipt>,
    pub outcome: Stage,
    pub status: StatusId,
    pub received_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BackorderLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackorderLinked {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub backorder_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub transition: Transition,
    pub cancellation: Cancellation,
    pub status: StatusId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDeactivated {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub deactivated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderSubmitted(PurchaseOrderSubmitted),
    ApprovalRequired(ApprovalRequired),
    PurchaseOrderApproved(PurchaseOrderApproved),
    PurchaseOrderRejected(PurchaseOrderRejected),
    PurchaseOrderIssued(PurchaseOrderIssued),
    GoodsReceived(GoodsReceived),
    BackorderLinked(BackorderLinked),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
    PurchaseOrderDeactivated(PurchaseOrderDeactivated),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::ApprovalRequired(_) => "purchasing.order.approval_required",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::PurchaseOrderRejected(_) => "purchasing.order.rejected",
            PurchaseOrderEvent::PurchaseOrderIssued(_) => "purchasing.order.issued",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::BackorderLinked(_) => "purchasing.order.backorder_linked",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
            PurchaseOrderEvent::PurchaseOrderDeactivated(_) => "purchasing.order.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.occurred_at,
            PurchaseOrderEvent::ApprovalRequired(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderRejected(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderIssued(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::BackorderLinked(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.company_id = Some(e.company_id);
                self.number = Some(e.number.clone());
                self.order_date = Some(e.order_date);
                self.supplier = Some(e.supplier.clone());
                self.store_id = Some(e.store_id);
                self.status = Some(e.status);
                self.approval = Approval::default();
                self.total_qty = e.lines.iter().map(|l| u64::from(l.ordered_qty)).sum();
                self.total_value = e.lines.iter().map(PurchaseOrderItem::line_value).sum();
                self.backorder_of = e.backorder_of;
                self.lines = e.lines.clone();
                self.active = true;
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => {
                self.approval.route(e.workflow.clone());
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::ApprovalRequired(_) => {}
            PurchaseOrderEvent::PurchaseOrderApproved(e) => {
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::PurchaseOrderRejected(e) => {
                self.approval.apply(&e.transition);
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::PurchaseOrderIssued(e) => {
                self.approval.enter(Stage::Issued);
                self.issued = Some(e.issued);
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                for receipt in &e.receipts {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == receipt.line_no)
                    {
                        line.received_qty = Some(receipt.received_qty);
                    }
                }
                self.approval.enter(e.outcome);
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::BackorderLinked(e) => {
                self.backorder = Some(e.backorder_id);
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => {
                self.approval.apply(&e.transition);
                self.cancellation = Some(e.cancellation.clone());
                self.status = Some(e.status);
            }
            PurchaseOrderEvent::PurchaseOrderDeactivated(_) => {
                self.active = false;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::SubmitPurchaseOrder(cmd) => self.handle_submit(cmd),
            PurchaseOrderCommand::ApprovePurchaseOrder(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::RejectPurchaseOrder(cmd) => self.handle_reject(cmd),
            PurchaseOrderCommand::IssuePurchaseOrder(cmd) => self.handle_issue(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::LinkBackorder(cmd) => self.handle_link_backorder(cmd),
            PurchaseOrderCommand::CancelPurchaseOrder(cmd) => self.handle_cancel(cmd),
            PurchaseOrderCommand::DeactivatePurchaseOrder(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_company(&self, company_id: CompanyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.company_id != Some(company_id) {
            return Err(DomainError::invariant("company mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    /// Common guard of every command on an existing order.
    fn ensure_open(&self, company_id: CompanyId, order_id: PurchaseOrderId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company(company_id)?;
        self.ensure_order_id(order_id)?;
        if !self.active {
            return Err(DomainError::conflict("purchase order is deactivated"));
        }
        Ok(())
    }

    fn ensure_statuses(statuses: &ProcessStatuses) -> DomainResult<()> {
        if statuses.process() != Process::PurchaseOrder {
            return Err(DomainError::invariant(format!(
                "expected purchase order statuses, got '{}'",
                statuses.process()
            )));
        }
        Ok(())
    }

    fn number_or_invariant(&self) -> DomainResult<DocumentNumber> {
        self.number
            .clone()
            .ok_or_else(|| DomainError::invariant("purchase order has no number"))
    }

    /// `ApprovalRequired` for the pending step a transition leaves behind.
    fn approval_required(
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        number: &DocumentNumber,
        transition: &Transition,
        occurred_at: DateTime<Utc>,
    ) -> Option<PurchaseOrderEvent> {
        if transition.to != Stage::ApprovalPending {
            return None;
        }
        let step = transition.step.as_ref()?;
        Some(PurchaseOrderEvent::ApprovalRequired(ApprovalRequired {
            company_id,
            order_id,
            number: number.clone(),
            level: step.level,
            approver_role: step.approver_role.clone(),
            occurred_at,
        }))
    }

    fn validate_new_lines(lines: &[NewLine]) -> DomainResult<Vec<PurchaseOrderItem>> {
        if lines.is_empty() {
            return Err(DomainError::validation(
                "lines",
                "a purchase order needs at least one line",
            ));
        }

        let mut violations = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            if line.ordered_qty < 1 || line.ordered_qty > i64::from(u32::MAX) {
                violations.push(FieldViolation::new(
                    format!("lines[{idx}].ordered_qty"),
                    "ordered quantity must be at least 1",
                ));
            }
            if line.unit_price < 0 {
                violations.push(FieldViolation::new(
                    format!("lines[{idx}].unit_price"),
                    "unit price cannot be negative",
                ));
            }
            if lines[..idx].iter().any(|l| l.item_id == line.item_id) {
                violations.push(FieldViolation::new(
                    format!("lines[{idx}].item_id"),
                    format!("item {} appears on more than one line", line.item_id),
                ));
            }
        }
        if !violations.is_empty() {
            return Err(DomainError::Validation(violations));
        }

        Ok(lines
            .iter()
            .enumerate()
            .map(|(idx, line)| PurchaseOrderItem {
                line_no: idx as u32 + 1,
                item_id: line.item_id,
                ordered_qty: line.ordered_qty as u32,
                unit_price: line.unit_price,
                received_qty: None,
            })
            .collect())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let expected_prefix = match cmd.backorder_of {
            Some(_) => NumberPrefix::Backorder,
            None => NumberPrefix::PurchaseOrder,
        };
        if cmd.number.prefix() != expected_prefix {
            return Err(DomainError::invariant(format!(
                "order number {} must use prefix {expected_prefix}",
                cmd.number
            )));
        }
        if cmd.number.supplier_code() != cmd.supplier.code {
            return Err(DomainError::invariant(format!(
                "order number {} does not belong to supplier {}",
                cmd.number, cmd.supplier.code
            )));
        }
        if cmd.backorder_of == Some(cmd.order_id) {
            return Err(DomainError::invariant("an order cannot be its own backorder"));
        }

        let lines = Self::validate_new_lines(&cmd.lines)?;

        let mut events = vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                number: cmd.number.clone(),
                order_date: cmd.order_date,
                supplier: cmd.supplier.clone(),
                store_id: cmd.store_id,
                lines,
                backorder_of: cmd.backorder_of,
                status: cmd.statuses.id_for(Stage::Created)?,
                created_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            },
        )];

        let transition = Approval::plan_open(
            cmd.first_level.as_ref(),
            cmd.submit,
            Stamp {
                by: cmd.created_by,
                on: cmd.occurred_at,
            },
        );
        if transition.to != Stage::Created {
            events.push(PurchaseOrderEvent::PurchaseOrderSubmitted(
                PurchaseOrderSubmitted {
                    company_id: cmd.company_id,
                    order_id: cmd.order_id,
                    workflow: cmd.first_level.clone(),
                    status: cmd.statuses.id_for(transition.to)?,
                    transition: transition.clone(),
                    occurred_at: cmd.occurred_at,
                },
            ));
            events.extend(Self::approval_required(
                cmd.company_id,
                cmd.order_id,
                &cmd.number,
                &transition,
                cmd.occurred_at,
            ));
        }
        Ok(events)
    }

    fn handle_submit(
        &self,
        cmd: &SubmitPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let transition = self.approval.plan_submit(
            cmd.first_level.as_ref(),
            Stamp {
                by: cmd.submitted_by,
                on: cmd.occurred_at,
            },
        )?;
        let number = self.number_or_invariant()?;

        let mut events = vec![PurchaseOrderEvent::PurchaseOrderSubmitted(
            PurchaseOrderSubmitted {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                workflow: cmd.first_level.clone(),
                status: cmd.statuses.id_for(transition.to)?,
                transition: transition.clone(),
                occurred_at: cmd.occurred_at,
            },
        )];
        events.extend(Self::approval_required(
            cmd.company_id,
            cmd.order_id,
            &number,
            &transition,
            cmd.occurred_at,
        ));
        Ok(events)
    }

    fn handle_approve(
        &self,
        cmd: &ApprovePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
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
        let number = self.number_or_invariant()?;
        let finalized = transition.step.as_ref().is_some_and(|s| s.is_finalized);

        let mut events = vec![PurchaseOrderEvent::PurchaseOrderApproved(
            PurchaseOrderApproved {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                status: cmd.statuses.id_for(transition.to)?,
                transition: transition.clone(),
                finalized,
                occurred_at: cmd.occurred_at,
            },
        )];
        events.extend(Self::approval_required(
            cmd.company_id,
            cmd.order_id,
            &number,
            &transition,
            cmd.occurred_at,
        ));
        Ok(events)
    }

    fn handle_reject(
        &self,
        cmd: &RejectPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let transition = self.approval.plan_reject(
            &cmd.acting_role,
            Stamp {
                by: cmd.rejected_by,
                on: cmd.occurred_at,
            },
            &cmd.comment,
        )?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderRejected(
            PurchaseOrderRejected {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                status: cmd.statuses.id_for(transition.to)?,
                transition,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_issue(
        &self,
        cmd: &IssuePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        if self.issued.is_some() {
            return Err(DomainError::conflict("purchase order is already issued"));
        }
        match self.stage() {
            Stage::ApproverCompleted => {}
            Stage::Cancelled => return Err(DomainError::conflict("purchase order is cancelled")),
            other => {
                return Err(DomainError::conflict(format!(
                    "only approver-completed orders can be issued (stage {other:?})"
                )));
            }
        }
        if self.trail().pending_step().is_some() {
            return Err(DomainError::invariant(
                "approval trail still has a pending step",
            ));
        }

        let supplier = self
            .supplier
            .clone()
            .ok_or_else(|| DomainError::invariant("supplier must be set"))?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderIssued(
            PurchaseOrderIssued {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                number: self.number_or_invariant()?,
                supplier,
                status: cmd.statuses.id_for(Stage::Issued)?,
                issued: Stamp {
                    by: cmd.issued_by,
                    on: cmd.occurred_at,
                },
                notify_supplier: cmd.notify_supplier,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(
        &self,
        cmd: &ReceiveGoods,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        match self.stage() {
            Stage::Issued => {}
            Stage::Cancelled => return Err(DomainError::conflict("purchase order is cancelled")),
            Stage::Received | Stage::PartiallyReceived => {
                return Err(DomainError::conflict("purchase order was already received"));
            }
            other => {
                return Err(DomainError::conflict(format!(
                    "cannot receive goods before the order is issued (stage {other:?})"
                )));
            }
        }

        let store_id = self
            .store_id
            .ok_or_else(|| DomainError::invariant("destination store must be set"))?;
        let plan = plan_receipt(&self.lines, &cmd.entries)?;

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            company_id: cmd.company_id,
            order_id: cmd.order_id,
            store_id,
            status: cmd.statuses.id_for(plan.outcome)?,
            receipts: plan.receipts,
            outcome: plan.outcome,
            received_by: cmd.received_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_backorder(
        &self,
        cmd: &LinkBackorder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;

        if let Some(existing) = self.backorder {
            return Err(DomainError::conflict(format!(
                "backorder {existing} already exists for this order"
            )));
        }
        if self.stage() != Stage::PartiallyReceived {
            return Err(DomainError::conflict(format!(
                "only partially received orders can be backordered (stage {:?})",
                self.stage()
            )));
        }
        if cmd.backorder_id == self.id {
            return Err(DomainError::invariant("an order cannot be its own backorder"));
        }

        Ok(vec![PurchaseOrderEvent::BackorderLinked(BackorderLinked {
            company_id: cmd.company_id,
            order_id: cmd.order_id,
            backorder_id: cmd.backorder_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;
        Self::ensure_statuses(&cmd.statuses)?;

        let transition = self.approval.plan_cancel()?;

        let note = cmd
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if cmd.reason == CancelReason::Other && note.is_none() {
            return Err(DomainError::validation(
                "note",
                "a note is required when the cancel reason is 'other'",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                status: cmd.statuses.id_for(transition.to)?,
                transition,
                cancellation: Cancellation {
                    reason: cmd.reason,
                    note,
                    cancelled: Stamp {
                        by: cmd.cancelled_by,
                        on: cmd.occurred_at,
                    },
                },
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_open(cmd.company_id, cmd.order_id)?;

        if !matches!(self.stage(), Stage::Created | Stage::Cancelled) {
            return Err(DomainError::conflict(format!(
                "only draft or cancelled orders can be deactivated (stage {:?})",
                self.stage()
            )));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderDeactivated(
            PurchaseOrderDeactivated {
                company_id: cmd.company_id,
                order_id: cmd.order_id,
                deactivated_by: cmd.deactivated_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
