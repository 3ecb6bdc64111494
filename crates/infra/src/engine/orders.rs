use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use depotflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DocumentNumber, DomainError, FieldViolation,
    NumberPrefix, StoreId, UserId,
};
use depotflow_events::{EventBus, EventEnvelope, execute};
use depotflow_inventory::{InventoryCommand, InventoryRecord, InventoryRecordId, RecordReceipt};
use depotflow_purchasing::{
    ApprovePurchaseOrder, CancelPurchaseOrder, CancelReason, CreatePurchaseOrder,
    DeactivatePurchaseOrder, IssuePurchaseOrder, LinkBackorder, NewLine, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, ReceiptEntry, ReceiveGoods,
    RejectPurchaseOrder, SubmitPurchaseOrder, SupplierRef, plan_backorder,
};
use depotflow_workflow::{Process, ProcessStatuses, WorkflowConfig};

use super::{INVENTORY_AGGREGATE, ORDER_AGGREGATE, Outbox, ProcurementEngine};
use crate::error::EngineError;
use crate::locks::DocumentKey;
use crate::sequence::SequenceKey;
use crate::store::{Changeset, ProcurementStore};

/// Input of [`ProcurementEngine::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub company_id: CompanyId,
    pub order_date: NaiveDate,
    pub supplier: SupplierRef,
    pub store_id: StoreId,
    pub lines: Vec<NewLine>,
    /// `false` saves a draft that stays `Created`.
    pub submit: bool,
    pub created_by: UserId,
}

struct OrderDraft<'a> {
    company_id: CompanyId,
    order_id: PurchaseOrderId,
    order_date: NaiveDate,
    supplier: &'a SupplierRef,
    store_id: StoreId,
    lines: &'a [NewLine],
    backorder_of: Option<PurchaseOrderId>,
    submit: bool,
    first_level: Option<WorkflowConfig>,
    statuses: &'a ProcessStatuses,
    created_by: UserId,
}

impl OrderDraft<'_> {
    fn command(&self, number: DocumentNumber) -> PurchaseOrderCommand {
        PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            company_id: self.company_id,
            order_id: self.order_id,
            number,
            order_date: self.order_date,
            supplier: self.supplier.clone(),
            store_id: self.store_id,
            lines: self.lines.to_vec(),
            backorder_of: self.backorder_of,
            submit: self.submit,
            first_level: self.first_level.clone(),
            statuses: self.statuses.clone(),
            created_by: self.created_by,
            occurred_at: Utc::now(),
        })
    }

    fn prefix(&self) -> NumberPrefix {
        if self.backorder_of.is_some() {
            NumberPrefix::Backorder
        } else {
            NumberPrefix::PurchaseOrder
        }
    }
}

impl<S, B> ProcurementEngine<S, B>
where
    S: ProcurementStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Decide the creation with a provisional number, then allocate the real
    /// one. Invalid drafts never consume a sequence value.
    fn open_order(&self, draft: &OrderDraft<'_>) -> Result<(PurchaseOrder, Outbox), EngineError> {
        let key = SequenceKey::new(
            draft.company_id,
            &draft.supplier.code,
            draft.prefix(),
            draft.order_date,
        );
        PurchaseOrder::empty(draft.order_id).handle(&draft.command(key.number(1)?))?;

        let number = key.number(self.sequences.next(&key)?)?;
        let mut order = PurchaseOrder::empty(draft.order_id);
        let events = execute(&mut order, &draft.command(number))?;

        let mut outbox = Outbox::default();
        outbox.record(draft.company_id, draft.order_id.0, ORDER_AGGREGATE, 0, &events)?;
        Ok((order, outbox))
    }

    /// Load, decide and commit one order transition under its lock.
    fn transition_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        decide: impl FnOnce(&PurchaseOrder) -> Result<PurchaseOrderCommand, EngineError>,
    ) -> Result<PurchaseOrder, EngineError> {
        self.locks.with_lock(DocumentKey::new(company_id, order_id), || {
            let mut order = self.require_order(company_id, order_id)?;
            let read_version = order.version();

            let command = decide(&order)?;
            let events = execute(&mut order, &command)?;

            let mut outbox = Outbox::default();
            outbox.record(company_id, order_id.0, ORDER_AGGREGATE, read_version, &events)?;
            let mut changeset = Changeset::new();
            changeset.put_order(order.clone(), read_version);
            self.commit(changeset, outbox)?;
            Ok(order)
        })
    }

    #[instrument(
        skip(self, request),
        fields(company_id = %request.company_id, supplier = %request.supplier.code, order_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub fn create_order(&self, request: NewPurchaseOrder) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(request.company_id, Process::PurchaseOrder)?;
        let order_id = PurchaseOrderId::new(AggregateId::new());
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        let draft = OrderDraft {
            company_id: request.company_id,
            order_id,
            order_date: request.order_date,
            supplier: &request.supplier,
            store_id: request.store_id,
            lines: &request.lines,
            backorder_of: None,
            submit: request.submit,
            first_level: self.first_level(request.company_id, Process::PurchaseOrder),
            statuses: &statuses,
            created_by: request.created_by,
        };
        let (order, outbox) = self.open_order(&draft)?;

        let mut changeset = Changeset::new();
        changeset.put_order(order.clone(), 0);
        self.commit(changeset, outbox)?;

        info!(
            number = %order.number().map(ToString::to_string).unwrap_or_default(),
            stage = ?order.stage(),
            "purchase order created"
        );
        Ok(order)
    }

    /// Submit a draft, routing it to the first approval level (or straight to
    /// `ApproverCompleted` when the company has none configured).
    #[instrument(skip(self), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn submit_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        submitted_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;
        let first_level = self.first_level(company_id, Process::PurchaseOrder);
        self.transition_order(company_id, order_id, |_| {
            Ok(PurchaseOrderCommand::SubmitPurchaseOrder(SubmitPurchaseOrder {
                company_id,
                order_id,
                first_level,
                statuses,
                submitted_by,
                occurred_at: Utc::now(),
            }))
        })
    }

    #[instrument(skip(self, comment), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn approve_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        acting_role: &str,
        approved_by: UserId,
        comment: Option<String>,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;
        let order = self.transition_order(company_id, order_id, |order| {
            Ok(PurchaseOrderCommand::ApprovePurchaseOrder(ApprovePurchaseOrder {
                company_id,
                order_id,
                acting_role: acting_role.to_string(),
                next_level: self.next_level(company_id, Process::PurchaseOrder, order.trail()),
                statuses,
                approved_by,
                comment,
                occurred_at: Utc::now(),
            }))
        })?;
        info!(stage = ?order.stage(), "purchase order approved");
        Ok(order)
    }

    /// Send the order back to `Created`. The comment is mandatory.
    #[instrument(skip(self, comment), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn reject_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        acting_role: &str,
        rejected_by: UserId,
        comment: String,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;
        self.transition_order(company_id, order_id, |_| {
            Ok(PurchaseOrderCommand::RejectPurchaseOrder(RejectPurchaseOrder {
                company_id,
                order_id,
                acting_role: acting_role.to_string(),
                statuses,
                rejected_by,
                comment,
                occurred_at: Utc::now(),
            }))
        })
    }

    #[instrument(skip(self), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn issue_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        issued_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;
        let notify_supplier = self.settings.notify_supplier_on_issue;
        let order = self.transition_order(company_id, order_id, |_| {
            Ok(PurchaseOrderCommand::IssuePurchaseOrder(IssuePurchaseOrder {
                company_id,
                order_id,
                statuses,
                issued_by,
                notify_supplier,
                occurred_at: Utc::now(),
            }))
        })?;
        info!(notify_supplier, "purchase order issued");
        Ok(order)
    }

    /// Record a receiving batch and put the received stock on hand.
    ///
    /// One inventory record is written per line that received a positive
    /// quantity, costed at the order's frozen unit price and priced at the
    /// item's current selling price. The order transition and the records
    /// commit together.
    #[instrument(skip(self, entries), fields(company_id = %company_id, order_id = %order_id, entries = entries.len()), err(level = "warn"))]
    pub fn receive_goods(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        entries: Vec<ReceiptEntry>,
        received_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;

        self.locks.with_lock(DocumentKey::new(company_id, order_id), || {
            let mut order = self.require_order(company_id, order_id)?;
            let read_version = order.version();
            let occurred_at = Utc::now();
            let entry_index: HashMap<u32, usize> = entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| (entry.line_no, idx))
                .collect();

            let events = execute(
                &mut order,
                &PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                    company_id,
                    order_id,
                    entries,
                    statuses,
                    received_by,
                    occurred_at,
                }),
            )?;

            let mut outbox = Outbox::default();
            outbox.record(company_id, order_id.0, ORDER_AGGREGATE, read_version, &events)?;

            let mut changeset = Changeset::new();
            let mut missing_prices = Vec::new();
            for event in &events {
                let PurchaseOrderEvent::GoodsReceived(received) = event else {
                    continue;
                };
                for receipt in &received.receipts {
                    if receipt.received_qty == 0 {
                        continue;
                    }
                    let Some(sale_price) = self.prices.selling_price(company_id, receipt.item_id)
                    else {
                        let field = match entry_index.get(&receipt.line_no) {
                            Some(idx) => format!("entries[{idx}].line_no"),
                            None => format!("line_no {}", receipt.line_no),
                        };
                        missing_prices.push(FieldViolation::new(
                            field,
                            format!("item {} has no selling price", receipt.item_id),
                        ));
                        continue;
                    };

                    let record_id = InventoryRecordId::new(AggregateId::new());
                    let mut record = InventoryRecord::empty(record_id);
                    let stocked = execute(
                        &mut record,
                        &InventoryCommand::RecordReceipt(RecordReceipt {
                            company_id,
                            record_id,
                            item_id: receipt.item_id,
                            store_id: received.store_id,
                            source_order: order_id.0,
                            quantity: receipt.received_qty,
                            unit_cost: receipt.unit_price,
                            sale_price,
                            occurred_at,
                        }),
                    )?;
                    outbox.record(company_id, record_id.0, INVENTORY_AGGREGATE, 0, &stocked)?;
                    changeset.put_inventory(record, 0);
                }
            }
            if !missing_prices.is_empty() {
                return Err(DomainError::Validation(missing_prices).into());
            }

            changeset.put_order(order.clone(), read_version);
            let stocked_records = changeset.inventory().len();
            self.commit(changeset, outbox)?;

            info!(stage = ?order.stage(), stocked_records, "goods received");
            Ok(order)
        })
    }

    /// Spawn the backorder of a partially received order.
    ///
    /// The new order carries every line's remaining quantity at the frozen
    /// unit price, is numbered in the `BO` sequence, and is submitted right
    /// away. Source link and new order commit together; a second spawn for
    /// the same source is a conflict.
    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id), err(level = "warn"))]
    pub fn spawn_backorder(
        &self,
        company_id: CompanyId,
        source_id: PurchaseOrderId,
        created_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;

        self.locks.with_lock(DocumentKey::new(company_id, source_id), || {
            let mut source = self.require_order(company_id, source_id)?;
            let source_version = source.version();

            let lines = plan_backorder(&source)?;
            let supplier = source
                .supplier()
                .cloned()
                .ok_or_else(|| DomainError::invariant("source order has no supplier"))?;
            let store_id = source
                .store_id()
                .ok_or_else(|| DomainError::invariant("source order has no store"))?;

            let backorder_id = PurchaseOrderId::new(AggregateId::new());
            let link = execute(
                &mut source,
                &PurchaseOrderCommand::LinkBackorder(LinkBackorder {
                    company_id,
                    order_id: source_id,
                    backorder_id,
                    occurred_at: Utc::now(),
                }),
            )?;

            let draft = OrderDraft {
                company_id,
                order_id: backorder_id,
                order_date: Utc::now().date_naive(),
                supplier: &supplier,
                store_id,
                lines: &lines,
                backorder_of: Some(source_id),
                submit: true,
                first_level: self.first_level(company_id, Process::PurchaseOrder),
                statuses: &statuses,
                created_by,
            };
            let (backorder, mut outbox) = self.open_order(&draft)?;
            outbox.record(company_id, source_id.0, ORDER_AGGREGATE, source_version, &link)?;

            let mut changeset = Changeset::new();
            changeset
                .put_order(backorder.clone(), 0)
                .put_order(source, source_version);
            self.commit(changeset, outbox)?;

            info!(
                backorder_id = %backorder_id,
                number = %backorder.number().map(ToString::to_string).unwrap_or_default(),
                lines = backorder.lines().len(),
                "backorder spawned"
            );
            Ok(backorder)
        })
    }

    #[instrument(skip(self, note), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn cancel_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        reason: CancelReason,
        note: Option<String>,
        cancelled_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        let statuses = self.process_statuses(company_id, Process::PurchaseOrder)?;
        self.transition_order(company_id, order_id, |_| {
            Ok(PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
                company_id,
                order_id,
                reason,
                note,
                statuses,
                cancelled_by,
                occurred_at: Utc::now(),
            }))
        })
    }

    /// Soft-delete. Drafts (`Created`) and cancelled orders can be deactivated.
    #[instrument(skip(self), fields(company_id = %company_id, order_id = %order_id), err(level = "warn"))]
    pub fn deactivate_order(
        &self,
        company_id: CompanyId,
        order_id: PurchaseOrderId,
        deactivated_by: UserId,
    ) -> Result<PurchaseOrder, EngineError> {
        self.transition_order(company_id, order_id, |_| {
            Ok(PurchaseOrderCommand::DeactivatePurchaseOrder(
                DeactivatePurchaseOrder {
                    company_id,
                    order_id,
                    deactivated_by,
                    occurred_at: Utc::now(),
                },
            ))
        })
    }
}
