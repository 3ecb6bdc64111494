use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};

use depotflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DomainError, FieldViolation, ItemId,
    NumberPrefix, UserId,
};
use depotflow_events::{EventBus, EventEnvelope, execute};
use depotflow_inventory::{
    InventoryCommand, InventoryEvent, InventoryRecord, RestoreStock, WithdrawStock, plan_restore,
    plan_withdrawal,
};
use depotflow_purchasing::PurchaseOrderId;
use depotflow_returns::{
    ApproveReturnRequest, AttachmentMeta, CreateReturnRequest, OrderReturnables,
    RejectReturnRequest, ResubmitReturnRequest, ReturnLine, ReturnRequest, ReturnRequestCommand,
    ReturnRequestEvent, ReturnRequestId, ReturnRequestItem,
};
use depotflow_workflow::Process;

use super::{INVENTORY_AGGREGATE, Outbox, ProcurementEngine, RETURN_AGGREGATE};
use crate::error::EngineError;
use crate::locks::DocumentKey;
use crate::sequence::SequenceKey;
use crate::store::{Changeset, ProcurementStore};

/// Input of [`ProcurementEngine::create_return`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReturnRequest {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
    pub return_date: NaiveDate,
    pub lines: Vec<ReturnLine>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub created_by: UserId,
}

/// Input of [`ProcurementEngine::resubmit_return`]: the edited request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRevision {
    pub company_id: CompanyId,
    pub return_id: ReturnRequestId,
    pub lines: Vec<ReturnLine>,
    pub remark: Option<String>,
    pub attachment: Option<AttachmentMeta>,
    pub resubmitted_by: UserId,
    pub comment: Option<String>,
}

struct Tracked {
    record: InventoryRecord,
    read_version: u64,
    events: Vec<InventoryEvent>,
}

/// Inventory records of one order touched by a return transition, loaded
/// lazily per item and committed with the return.
struct InventoryWorkset {
    company_id: CompanyId,
    order_id: PurchaseOrderId,
    return_id: ReturnRequestId,
    occurred_at: DateTime<Utc>,
    items: BTreeMap<ItemId, Vec<Tracked>>,
}

impl InventoryWorkset {
    fn new(
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        return_id: ReturnRequestId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            company_id,
            order_id,
            return_id,
            occurred_at,
            items: BTreeMap::new(),
        }
    }

    fn records<S: ProcurementStore>(
        &mut self,
        store: &S,
        item_id: ItemId,
    ) -> Result<&mut Vec<Tracked>, EngineError> {
        if !self.items.contains_key(&item_id) {
            let loaded = store
                .inventory_for(self.company_id, self.order_id, item_id)?
                .into_iter()
                .map(|record| Tracked {
                    read_version: record.version(),
                    record,
                    events: Vec::new(),
                })
                .collect();
            self.items.insert(item_id, loaded);
        }
        Ok(self.items.entry(item_id).or_default())
    }

    fn withdraw<S: ProcurementStore>(
        &mut self,
        store: &S,
        idx: usize,
        line: &ReturnRequestItem,
    ) -> Result<(), EngineError> {
        let source_return = self.return_id.0;
        let (company_id, occurred_at) = (self.company_id, self.occurred_at);
        let tracked = self.records(store, line.item_id)?;

        let snapshot: Vec<InventoryRecord> = tracked.iter().map(|t| t.record.clone()).collect();
        let plan = plan_withdrawal(&snapshot, line.returned_qty).map_err(|err| {
            DomainError::Validation(vec![FieldViolation::new(
                format!("lines[{idx}].returned_qty"),
                err.to_string(),
            )])
        })?;

        for (record_id, quantity) in plan {
            let target = find(tracked, record_id.0)?;
            let events = execute(
                &mut target.record,
                &InventoryCommand::WithdrawStock(WithdrawStock {
                    company_id,
                    record_id,
                    quantity,
                    source_return,
                    occurred_at,
                }),
            )?;
            target.events.extend(events);
        }
        Ok(())
    }

    fn restore<S: ProcurementStore>(
        &mut self,
        store: &S,
        line: &ReturnRequestItem,
    ) -> Result<(), EngineError> {
        let source_return = self.return_id.0;
        let (company_id, occurred_at) = (self.company_id, self.occurred_at);
        let tracked = self.records(store, line.item_id)?;

        let snapshot: Vec<InventoryRecord> = tracked.iter().map(|t| t.record.clone()).collect();
        for (record_id, quantity) in plan_restore(&snapshot, line.returned_qty)? {
            let target = find(tracked, record_id.0)?;
            let events = execute(
                &mut target.record,
                &InventoryCommand::RestoreStock(RestoreStock {
                    company_id,
                    record_id,
                    quantity,
                    source_return,
                    occurred_at,
                }),
            )?;
            target.events.extend(events);
        }
        Ok(())
    }

    /// Stage every record that moved. Returns how many were staged.
    fn stage(self, changeset: &mut Changeset, outbox: &mut Outbox) -> Result<usize, EngineError> {
        let mut staged = 0;
        for tracked in self.items.into_values().flatten() {
            if tracked.events.is_empty() {
                continue;
            }
            outbox.record(
                self.company_id,
                tracked.record.id_typed().0,
                INVENTORY_AGGREGATE,
                tracked.read_version,
                &tracked.events,
            )?;
            changeset.put_inventory(tracked.record, tracked.read_version);
            staged += 1;
        }
        Ok(staged)
    }
}

fn find(tracked: &mut [Tracked], id: AggregateId) -> Result<&mut Tracked, EngineError> {
    tracked
        .iter_mut()
        .find(|t| t.record.id_typed().0 == id)
        .ok_or_else(|| DomainError::invariant(format!("inventory record {id} left the workset")).into())
}

impl<S, B> ProcurementEngine<S, B>
where
    S: ProcurementStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Turn the inventory side effects of `events` into record updates.
    ///
    /// Reopened lines go back on hand before accepted lines come off, so a
    /// resubmission that lands directly on `ApproverCompleted` nets out.
    fn stage_inventory_effects(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        return_id: ReturnRequestId,
        events: &[ReturnRequestEvent],
        changeset: &mut Changeset,
        outbox: &mut Outbox,
    ) -> Result<(), EngineError> {
        let mut workset = InventoryWorkset::new(company_id, order_id, return_id, Utc::now());

        for event in events {
            if let ReturnRequestEvent::ReturnInventoryReopened(reopened) = event {
                for line in &reopened.lines {
                    workset.restore(&self.store, line)?;
                }
            }
        }
        for event in events {
            if let ReturnRequestEvent::ReturnAccepted(accepted) = event {
                for (idx, line) in accepted.lines.iter().enumerate() {
                    workset.withdraw(&self.store, idx, line)?;
                }
            }
        }

        let staged = workset.stage(changeset, outbox)?;
        if staged > 0 {
            debug!(staged, "inventory records adjusted by return");
        }
        Ok(())
    }

    fn returnables(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
    ) -> Result<OrderReturnables, EngineError> {
        let order = self.require_order(company_id, order_id)?;
        let existing = self.store.returns_for_order(company_id, order_id)?;
        Ok(OrderReturnables::collect(&order, &existing)?)
    }

    /// Order a return belongs to, read without the lock to pick the lock key.
    fn order_of_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
    ) -> Result<PurchaseOrderId, EngineError> {
        self.require_return(company_id, return_id)?
            .order_id()
            .ok_or_else(|| DomainError::invariant(format!("return {return_id} has no order")).into())
    }

    /// Load, decide and commit one return transition together with the
    /// inventory it moves, under the lock of the return's order.
    fn transition_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
        decide: impl FnOnce(&ReturnRequest, PurchaseOrderId) -> Result<ReturnRequestCommand, EngineError>,
    ) -> Result<ReturnRequest, EngineError> {
        let order_id = self.order_of_return(company_id, return_id)?;

        self.locks.with_lock(DocumentKey::new(company_id, order_id), || {
            let mut request = self.require_return(company_id, return_id)?;
            if request.order_id() != Some(order_id) {
                return Err(DomainError::conflict("return request moved to another order").into());
            }
            let read_version = request.version();

            let command = decide(&request, order_id)?;
            let events = execute(&mut request, &command)?;

            let mut outbox = Outbox::default();
            outbox.record(company_id, return_id.0, RETURN_AGGREGATE, read_version, &events)?;
            let mut changeset = Changeset::new();
            self.stage_inventory_effects(
                company_id,
                order_id,
                return_id,
                &events,
                &mut changeset,
                &mut outbox,
            )?;
            changeset.put_return(request.clone(), read_version);
            self.commit(changeset, outbox)?;
            Ok(request)
        })
    }

    /// Raise a return against a received (or partially received) order.
    ///
    /// Quantities are checked against what was received minus what every
    /// other return already claims. Without a configured workflow the return
    /// is accepted at once and its stock withdrawn in the same commit.
    #[instrument(
        skip(self, request),
        fields(company_id = %request.company_id, order_id = %request.order_id, return_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub fn create_return(&self, request: NewReturnRequest) -> Result<ReturnRequest, EngineError> {
        let company_id = request.company_id;
        let order_id = request.order_id;
        let statuses = self.process_statuses(company_id, Process::PurchaseReturn)?;
        let first_level = self.first_level(company_id, Process::PurchaseReturn);
        let return_id = ReturnRequestId::new(AggregateId::new());
        tracing::Span::current().record("return_id", tracing::field::display(return_id));

        self.locks.with_lock(DocumentKey::new(company_id, order_id), || {
            let order = self.returnables(company_id, order_id)?;
            let key = SequenceKey::new(
                company_id,
                &order.supplier.code,
                NumberPrefix::Return,
                request.return_date,
            );
            let command = |number| {
                ReturnRequestCommand::CreateReturnRequest(CreateReturnRequest {
                    company_id,
                    return_id,
                    number,
                    return_date: request.return_date,
                    order: order.clone(),
                    lines: request.lines.clone(),
                    remark: request.remark.clone(),
                    attachment: request.attachment.clone(),
                    first_level: first_level.clone(),
                    statuses: statuses.clone(),
                    created_by: request.created_by,
                    occurred_at: Utc::now(),
                })
            };
            ReturnRequest::empty(return_id).handle(&command(key.number(1)?))?;

            let number = key.number(self.sequences.next(&key)?)?;
            let mut created = ReturnRequest::empty(return_id);
            let events = execute(&mut created, &command(number))?;

            let mut outbox = Outbox::default();
            outbox.record(company_id, return_id.0, RETURN_AGGREGATE, 0, &events)?;
            let mut changeset = Changeset::new();
            self.stage_inventory_effects(
                company_id,
                order_id,
                return_id,
                &events,
                &mut changeset,
                &mut outbox,
            )?;
            changeset.put_return(created.clone(), 0);
            self.commit(changeset, outbox)?;

            info!(
                number = %created.number().map(ToString::to_string).unwrap_or_default(),
                stage = ?created.stage(),
                "return request created"
            );
            Ok(created)
        })
    }

    /// Replace the lines of an existing return and send it through approval
    /// again. Stock already withdrawn for it is put back first.
    #[instrument(skip(self, revision), fields(company_id = %revision.company_id, return_id = %revision.return_id), err(level = "warn"))]
    pub fn resubmit_return(&self, revision: ReturnRevision) -> Result<ReturnRequest, EngineError> {
        let company_id = revision.company_id;
        let statuses = self.process_statuses(company_id, Process::PurchaseReturn)?;
        let first_level = self.first_level(company_id, Process::PurchaseReturn);

        let request = self.transition_return(company_id, revision.return_id, |_, order_id| {
            Ok(ReturnRequestCommand::ResubmitReturnRequest(
                ResubmitReturnRequest {
                    company_id,
                    return_id: revision.return_id,
                    order: self.returnables(company_id, order_id)?,
                    lines: revision.lines,
                    remark: revision.remark,
                    attachment: revision.attachment,
                    first_level,
                    statuses,
                    resubmitted_by: revision.resubmitted_by,
                    comment: revision.comment,
                    occurred_at: Utc::now(),
                },
            ))
        })?;
        info!(stage = ?request.stage(), "return request resubmitted");
        Ok(request)
    }

    #[instrument(skip(self, comment), fields(company_id = %company_id, return_id = %return_id), err(level = "warn"))]
    pub fn approve_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
        acting_role: &str,
        approved_by: UserId,
        comment: Option<String>,
    ) -> Result<ReturnRequest, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseReturn)?;
        let request = self.transition_return(company_id, return_id, |request, _| {
            Ok(ReturnRequestCommand::ApproveReturnRequest(
                ApproveReturnRequest {
                    company_id,
                    return_id,
                    acting_role: acting_role.to_string(),
                    next_level: self.next_level(
                        company_id,
                        Process::PurchaseReturn,
                        request.trail(),
                    ),
                    statuses,
                    approved_by,
                    comment,
                    occurred_at: Utc::now(),
                },
            ))
        })?;
        info!(stage = ?request.stage(), "return request approved");
        Ok(request)
    }

    #[instrument(skip(self, comment), fields(company_id = %company_id, return_id = %return_id), err(level = "warn"))]
    pub fn reject_return(
        &self,
        company_id: CompanyId,
        return_id: ReturnRequestId,
        acting_role: &str,
        rejected_by: UserId,
        comment: String,
    ) -> Result<ReturnRequest, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseReturn)?;
        self.transition_return(company_id, return_id, |_, _| {
            Ok(ReturnRequestCommand::RejectReturnRequest(
                RejectReturnRequest {
                    company_id,
                    return_id,
                    acting_role: acting_role.to_string(),
                    statuses,
                    rejected_by,
                    comment,
                    occurred_at: Utc::now(),
                },
            ))
        })
    }
}
