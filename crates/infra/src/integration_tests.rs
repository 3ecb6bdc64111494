//! Integration tests for the full procurement pipeline.
//!
//! Tests: Engine → aggregates → Changeset → Store → EventBus
//!
//! Verifies:
//! - Document numbers are unique and gap-free under concurrency
//! - Receiving, backorders and returns keep inventory consistent, also when racing
//! - Rejected operations change nothing and publish nothing

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use chrono::NaiveDate;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    use depotflow_core::{DomainError, ItemId, NumberPrefix};
    use depotflow_events::EventBus;
    use depotflow_purchasing::{
        CancelReason, NewLine, PurchaseOrder, PurchaseOrderId, ReceiptEntry,
    };
    use depotflow_returns::ReturnLine;
    use depotflow_workflow::{Process, Stage};

    use crate::engine::{NewPurchaseOrder, NewReturnRequest, ReturnRevision};
    use crate::error::EngineError;
    use crate::sequence::SequenceKey;
    use crate::settings::EngineSettings;
    use crate::store::{Changeset, ProcurementStore};
    use crate::test_support::{TestEngine, World, created_order};

    fn setup() -> (World, TestEngine) {
        depotflow_observability::init_for_tests();
        let world = World::new();
        let engine = world.engine();
        (world, engine)
    }

    fn new_order(world: &World, lines: &[(ItemId, i64)], submit: bool) -> NewPurchaseOrder {
        NewPurchaseOrder {
            company_id: world.company_id,
            order_date: World::order_date(),
            supplier: world.supplier.clone(),
            store_id: world.store_id,
            lines: lines
                .iter()
                .map(|(item_id, qty)| NewLine {
                    item_id: *item_id,
                    ordered_qty: *qty,
                    unit_price: 250,
                })
                .collect(),
            submit,
            created_by: world.user,
        }
    }

    /// Create, submit (no workflow configured) and issue an order.
    fn issued_order(world: &World, engine: &TestEngine, lines: &[(ItemId, i64)]) -> PurchaseOrder {
        let order = engine.create_order(new_order(world, lines, true)).unwrap();
        assert_eq!(order.stage(), Stage::ApproverCompleted);
        engine
            .issue_order(world.company_id, order.id_typed(), world.user)
            .unwrap()
    }

    fn receive(
        world: &World,
        engine: &TestEngine,
        order_id: PurchaseOrderId,
        quantities: &[i64],
    ) -> Result<PurchaseOrder, EngineError> {
        let entries = quantities
            .iter()
            .enumerate()
            .map(|(idx, qty)| ReceiptEntry {
                line_no: idx as u32 + 1,
                received_qty: *qty,
            })
            .collect();
        engine.receive_goods(world.company_id, order_id, entries, world.user)
    }

    fn return_of(world: &World, order_id: PurchaseOrderId, item_id: ItemId, qty: i64) -> NewReturnRequest {
        NewReturnRequest {
            company_id: world.company_id,
            order_id,
            return_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            lines: vec![ReturnLine {
                item_id,
                returned_qty: qty,
                reason: Some("damaged in transit".to_string()),
            }],
            remark: None,
            attachment: None,
            created_by: world.user,
        }
    }

    fn on_hand(world: &World, engine: &TestEngine, order_id: PurchaseOrderId, item_id: ItemId) -> u32 {
        engine
            .inventory_for(world.company_id, order_id, item_id)
            .unwrap()
            .iter()
            .map(|r| r.on_hand())
            .sum()
    }

    #[test]
    fn concurrent_creations_get_distinct_gap_free_numbers() {
        let (world, engine) = setup();
        let engine = Arc::new(engine);
        let item = world.item(900);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let engine = engine.clone();
                let request = new_order(&world, &[(item, 2)], false);
                thread::spawn(move || engine.create_order(request).unwrap())
            })
            .collect();

        let mut sequences: Vec<u32> = handles
            .into_iter()
            .map(|h| h.join().unwrap().number().unwrap().sequence())
            .collect();
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=50).collect::<Vec<u32>>());
    }

    #[test]
    fn invalid_draft_does_not_consume_a_number() {
        let (world, engine) = setup();

        let err = engine.create_order(new_order(&world, &[], true)).unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

        let item = world.item(900);
        let order = engine
            .create_order(new_order(&world, &[(item, 1)], true))
            .unwrap();
        assert_eq!(order.number().unwrap().to_string(), "PO-ACME-070324-1");
    }

    #[test]
    fn failed_commit_leaves_its_number_unused() {
        let (world, engine) = setup();
        // A number issued before this allocator existed.
        let mut changeset = Changeset::new();
        changeset.put_order(created_order(&world, 1, &[1]), 0);
        world.store.commit(changeset).unwrap();

        let item = world.item(900);
        let err = engine
            .create_order(new_order(&world, &[(item, 1)], false))
            .unwrap_err();
        assert!(err.is_retryable());

        let order = engine
            .create_order(new_order(&world, &[(item, 1)], false))
            .unwrap();
        assert_eq!(order.number().unwrap().sequence(), 2);

        let key = SequenceKey::new(
            world.company_id,
            "ACME",
            NumberPrefix::PurchaseOrder,
            World::order_date(),
        );
        assert_eq!(world.sequences.current(&key).unwrap(), 2);
    }

    #[test]
    fn draft_stays_created_until_submitted() {
        let (world, engine) = setup();
        let item = world.item(900);

        let draft = engine
            .create_order(new_order(&world, &[(item, 3)], false))
            .unwrap();
        assert_eq!(draft.stage(), Stage::Created);

        let err = engine
            .issue_order(world.company_id, draft.id_typed(), world.user)
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));

        let submitted = engine
            .submit_order(world.company_id, draft.id_typed(), world.user)
            .unwrap();
        assert_eq!(submitted.stage(), Stage::ApproverCompleted);
    }

    #[test]
    fn approval_walks_the_configured_chain() {
        let (world, engine) = setup();
        world
            .workflows
            .chain(world.company_id, Process::PurchaseOrder, &["buyer", "cfo"]);
        let item = world.item(900);

        let order = engine
            .create_order(new_order(&world, &[(item, 3)], true))
            .unwrap();
        let order_id = order.id_typed();
        assert_eq!(order.stage(), Stage::ApprovalPending);
        assert_eq!(order.trail().len(), 1);
        assert_eq!(order.trail().steps()[0].sequence_no, 0);
        assert_eq!(order.trail().steps()[0].level, 1);
        assert!(
            engine
                .issue_order(world.company_id, order_id, world.user)
                .is_err()
        );

        let err = engine
            .approve_order(world.company_id, order_id, "cfo", world.user, None)
            .unwrap_err();
        assert!(err.domain().is_some());

        let order = engine
            .approve_order(world.company_id, order_id, "buyer", world.user, None)
            .unwrap();
        assert_eq!(order.stage(), Stage::ApprovalPending);
        assert_eq!(
            order.trail().pending_step().map(|s| s.approver_role.as_str()),
            Some("cfo")
        );

        let order = engine
            .approve_order(world.company_id, order_id, "cfo", world.user, Some("ok".into()))
            .unwrap();
        assert_eq!(order.stage(), Stage::ApproverCompleted);

        let order = engine
            .issue_order(world.company_id, order_id, world.user)
            .unwrap();
        assert_eq!(order.stage(), Stage::Issued);
    }

    #[test]
    fn rejection_sends_the_order_back_to_created() {
        let (world, engine) = setup();
        world
            .workflows
            .chain(world.company_id, Process::PurchaseOrder, &["buyer"]);
        let item = world.item(900);
        let order = engine
            .create_order(new_order(&world, &[(item, 3)], true))
            .unwrap();

        let order = engine
            .reject_order(
                world.company_id,
                order.id_typed(),
                "buyer",
                world.user,
                "wrong supplier".to_string(),
            )
            .unwrap();
        assert_eq!(order.stage(), Stage::Created);

        let order = engine
            .deactivate_order(world.company_id, order.id_typed(), world.user)
            .unwrap();
        assert!(!order.is_active());
    }

    #[test]
    fn cancelling_twice_is_a_conflict() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = engine
            .create_order(new_order(&world, &[(item, 3)], true))
            .unwrap();

        let cancelled = engine
            .cancel_order(
                world.company_id,
                order.id_typed(),
                CancelReason::NoLongerNeeded,
                None,
                world.user,
            )
            .unwrap();
        assert_eq!(cancelled.stage(), Stage::Cancelled);

        let err = engine
            .cancel_order(
                world.company_id,
                order.id_typed(),
                CancelReason::Other,
                None,
                world.user,
            )
            .unwrap_err();
        assert!(err.is_retryable());

        let retired = engine
            .deactivate_order(world.company_id, order.id_typed(), world.user)
            .unwrap();
        assert!(!retired.is_active());
    }

    #[test]
    fn issued_order_cannot_be_deactivated() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 3)]);

        let err = engine
            .deactivate_order(world.company_id, order.id_typed(), world.user)
            .unwrap_err();
        assert!(err.domain().is_some());
    }

    #[test]
    fn receiving_stocks_inventory_at_order_cost_and_current_price() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);

        let order = receive(&world, &engine, order.id_typed(), &[10]).unwrap();
        assert_eq!(order.stage(), Stage::Received);

        let records = engine
            .inventory_for(world.company_id, order.id_typed(), item)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].on_hand(), 10);
        assert_eq!(records[0].unit_cost(), 250);
        assert_eq!(records[0].sale_price(), 900);
        assert_eq!(records[0].store_id(), Some(world.store_id));
    }

    #[test]
    fn missing_selling_price_rejects_the_whole_receipt() {
        let (world, engine) = setup();
        let priced = world.item(900);
        let unpriced = ItemId::new();
        let order = issued_order(&world, &engine, &[(priced, 2), (unpriced, 2)]);

        // Entries out of line order: the violation points at the entry.
        let entries = vec![
            ReceiptEntry {
                line_no: 2,
                received_qty: 2,
            },
            ReceiptEntry {
                line_no: 1,
                received_qty: 2,
            },
        ];
        let err = engine
            .receive_goods(world.company_id, order.id_typed(), entries, world.user)
            .unwrap_err();
        match err.domain() {
            Some(DomainError::Validation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "entries[0].line_no");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }

        let order = engine
            .order(world.company_id, order.id_typed())
            .unwrap()
            .unwrap();
        assert_eq!(order.stage(), Stage::Issued);
        assert_eq!(on_hand(&world, &engine, order.id_typed(), priced), 0);
    }

    #[test]
    fn partial_receipt_spawns_one_backorder_for_the_remainder() {
        let (world, engine) = setup();
        let bolts = world.item(900);
        let nuts = world.item(100);
        let order = issued_order(&world, &engine, &[(bolts, 10), (nuts, 5)]);
        let source_id = order.id_typed();

        let order = receive(&world, &engine, source_id, &[6, 5]).unwrap();
        assert_eq!(order.stage(), Stage::PartiallyReceived);

        let backorder = engine
            .spawn_backorder(world.company_id, source_id, world.user)
            .unwrap();
        assert_eq!(backorder.backorder_of(), Some(source_id));
        assert_eq!(backorder.lines().len(), 1);
        assert_eq!(backorder.lines()[0].item_id, bolts);
        assert_eq!(backorder.lines()[0].ordered_qty, 4);
        assert_eq!(backorder.lines()[0].unit_price, 250);
        assert!(backorder.number().unwrap().to_string().starts_with("BO-ACME-"));
        assert_eq!(backorder.stage(), Stage::ApproverCompleted);

        let source = engine.order(world.company_id, source_id).unwrap().unwrap();
        assert_eq!(source.backorder(), Some(backorder.id_typed()));
        assert_eq!(
            engine
                .backorder_of(world.company_id, source_id)
                .unwrap()
                .map(|o| o.id_typed()),
            Some(backorder.id_typed())
        );

        let err = engine
            .spawn_backorder(world.company_id, source_id, world.user)
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn fully_received_order_has_nothing_to_backorder() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 4)]);
        receive(&world, &engine, order.id_typed(), &[4]).unwrap();

        assert!(
            engine
                .spawn_backorder(world.company_id, order.id_typed(), world.user)
                .is_err()
        );
    }

    #[test]
    fn concurrent_backorder_spawns_yield_exactly_one() {
        let (world, engine) = setup();
        let engine = Arc::new(engine);
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let source_id = order.id_typed();
        receive(&world, &engine, source_id, &[4]).unwrap();

        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                let (company_id, user) = (world.company_id, world.user);
                thread::spawn(move || {
                    barrier.wait();
                    engine.spawn_backorder(company_id, source_id, user)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let spawned: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].lines()[0].ordered_qty, 6);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err.domain(), Some(DomainError::Conflict(_))), "{err}");
        }

        let source = engine.order(world.company_id, source_id).unwrap().unwrap();
        assert_eq!(source.backorder(), Some(spawned[0].id_typed()));
    }

    #[test]
    fn concurrent_returns_never_exceed_the_receipt() {
        let (world, engine) = setup();
        let engine = Arc::new(engine);
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 6)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[6]).unwrap();

        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                let request = return_of(&world, order_id, item, 1);
                thread::spawn(move || {
                    barrier.wait();
                    engine.create_return(request)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 6);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err.domain(), Some(DomainError::Validation(_))), "{err}");
        }
        assert_eq!(engine.already_returned(world.company_id, order_id, item).unwrap(), 6);
        assert_eq!(on_hand(&world, &engine, order_id, item), 0);
        assert_eq!(
            engine
                .returns_for_order(world.company_id, order_id)
                .unwrap()
                .len(),
            6
        );
    }

    #[test]
    fn receipt_racing_returns_stays_consistent() {
        let (world, engine) = setup();
        let engine = Arc::new(engine);
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 6)]);
        let order_id = order.id_typed();

        let barrier = Arc::new(Barrier::new(9));
        let receiver = {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let (company_id, user) = (world.company_id, world.user);
            thread::spawn(move || {
                barrier.wait();
                let entries = vec![ReceiptEntry {
                    line_no: 1,
                    received_qty: 6,
                }];
                engine.receive_goods(company_id, order_id, entries, user)
            })
        };
        let returners: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                let request = return_of(&world, order_id, item, 1);
                thread::spawn(move || {
                    barrier.wait();
                    engine.create_return(request)
                })
            })
            .collect();

        let received = receiver.join().unwrap().unwrap();
        assert_eq!(received.stage(), Stage::Received);
        let accepted = returners
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count() as u32;

        assert!(accepted <= 6);
        assert_eq!(
            engine.already_returned(world.company_id, order_id, item).unwrap(),
            accepted
        );
        assert_eq!(on_hand(&world, &engine, order_id, item), 6 - accepted);
    }

    #[test]
    fn return_quantities_are_bounded_by_what_remains() -> anyhow::Result<()> {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[10])?;

        let first = engine.create_return(return_of(&world, order_id, item, 3))?;
        assert_eq!(first.stage(), Stage::ApproverCompleted);
        assert!(first.number().unwrap().to_string().starts_with("RO-ACME-200324-"));
        assert_eq!(engine.already_returned(world.company_id, order_id, item)?, 3);

        let err = engine
            .create_return(return_of(&world, order_id, item, 8))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

        engine.create_return(return_of(&world, order_id, item, 7))?;
        assert_eq!(engine.already_returned(world.company_id, order_id, item)?, 10);
        assert_eq!(engine.returnable_qty(world.company_id, order_id, item)?, 0);
        assert_eq!(on_hand(&world, &engine, order_id, item), 0);
        Ok(())
    }

    #[test]
    fn returns_need_a_received_order() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);

        let err = engine
            .create_return(return_of(&world, order.id_typed(), item, 1))
            .unwrap_err();
        assert!(err.domain().is_some());
        assert!(
            engine
                .returns_for_order(world.company_id, order.id_typed())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn approved_return_withdraws_stock_on_final_level_only() {
        let (world, engine) = setup();
        world
            .workflows
            .chain(world.company_id, Process::PurchaseReturn, &["store_manager"]);
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[10]).unwrap();

        let request = engine
            .create_return(return_of(&world, order_id, item, 3))
            .unwrap();
        assert_eq!(request.stage(), Stage::ApprovalPending);
        assert_eq!(on_hand(&world, &engine, order_id, item), 10);

        let request = engine
            .approve_return(
                world.company_id,
                request.id_typed(),
                "store_manager",
                world.user,
                None,
            )
            .unwrap();
        assert_eq!(request.stage(), Stage::ApproverCompleted);
        assert!(request.inventory_applied());
        assert_eq!(on_hand(&world, &engine, order_id, item), 7);
    }

    #[test]
    fn rejected_return_can_be_resubmitted() {
        let (world, engine) = setup();
        world
            .workflows
            .chain(world.company_id, Process::PurchaseReturn, &["store_manager"]);
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[10]).unwrap();
        let request = engine
            .create_return(return_of(&world, order_id, item, 3))
            .unwrap();

        let request = engine
            .reject_return(
                world.company_id,
                request.id_typed(),
                "store_manager",
                world.user,
                "photos missing".to_string(),
            )
            .unwrap();
        assert_eq!(request.stage(), Stage::Created);

        let request = engine
            .resubmit_return(ReturnRevision {
                company_id: world.company_id,
                return_id: request.id_typed(),
                lines: return_of(&world, order_id, item, 4).lines,
                remark: Some("photos attached".to_string()),
                attachment: None,
                resubmitted_by: world.user,
                comment: None,
            })
            .unwrap();
        assert_eq!(request.stage(), Stage::ApprovalPending);
        assert_eq!(request.lines()[0].returned_qty, 4);
        assert_eq!(on_hand(&world, &engine, order_id, item), 10);
    }

    #[test]
    fn resubmitting_an_accepted_return_restores_then_withdraws() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[10]).unwrap();

        let request = engine
            .create_return(return_of(&world, order_id, item, 3))
            .unwrap();
        assert_eq!(on_hand(&world, &engine, order_id, item), 7);

        // The edited line does not count against itself: 9 of 10 is fine.
        let request = engine
            .resubmit_return(ReturnRevision {
                company_id: world.company_id,
                return_id: request.id_typed(),
                lines: return_of(&world, order_id, item, 9).lines,
                remark: None,
                attachment: None,
                resubmitted_by: world.user,
                comment: Some("more damage found".to_string()),
            })
            .unwrap();
        assert_eq!(request.stage(), Stage::ApproverCompleted);
        assert_eq!(on_hand(&world, &engine, order_id, item), 1);
        assert_eq!(engine.already_returned(world.company_id, order_id, item).unwrap(), 9);
    }

    #[test]
    fn unchanged_resubmission_validates_when_everything_is_returned() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 10)]);
        let order_id = order.id_typed();
        receive(&world, &engine, order_id, &[10]).unwrap();

        let request = engine
            .create_return(return_of(&world, order_id, item, 10))
            .unwrap();
        assert_eq!(engine.returnable_qty(world.company_id, order_id, item).unwrap(), 0);

        let request = engine
            .resubmit_return(ReturnRevision {
                company_id: world.company_id,
                return_id: request.id_typed(),
                lines: return_of(&world, order_id, item, 10).lines,
                remark: None,
                attachment: None,
                resubmitted_by: world.user,
                comment: None,
            })
            .unwrap();
        assert_eq!(request.stage(), Stage::ApproverCompleted);
        assert_eq!(on_hand(&world, &engine, order_id, item), 0);
    }

    #[test]
    fn events_are_published_after_commit_only() {
        let (world, engine) = setup();
        let subscription = world.bus.subscribe();
        let item = world.item(900);

        let order = engine
            .create_order(new_order(&world, &[(item, 3)], false))
            .unwrap();
        let published = subscription.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "purchasing.order.created");
        assert_eq!(published[0].aggregate_type(), "purchasing.order");
        assert_eq!(published[0].aggregate_id(), order.id_typed().0);
        assert_eq!(published[0].company_id(), world.company_id);
        assert_eq!(published[0].sequence_number(), 1);

        // Rejected transition: nothing stored, nothing published.
        assert!(
            engine
                .issue_order(world.company_id, order.id_typed(), world.user)
                .is_err()
        );
        assert!(subscription.drain().is_empty());

        engine
            .submit_order(world.company_id, order.id_typed(), world.user)
            .unwrap();
        let published = subscription.drain();
        assert!(!published.is_empty());
        assert_eq!(published[0].sequence_number(), 2);
        assert_eq!(published[0].event_type(), "purchasing.order.submitted");
    }

    #[test]
    fn issue_carries_the_supplier_notification_setting() {
        let world = World::new();
        let engine = world.engine_with(EngineSettings {
            notify_supplier_on_issue: false,
            ..EngineSettings::default()
        });
        let subscription = world.bus.subscribe();
        let item = world.item(900);

        issued_order(&world, &engine, &[(item, 1)]);
        let issued = subscription
            .drain()
            .into_iter()
            .find(|e| e.event_type() == "purchasing.order.issued")
            .unwrap();
        let payload = issued.payload().to_string();
        assert!(payload.contains("\"notify_supplier\":false"));
    }

    #[test]
    fn unknown_order_is_not_found() {
        let (world, engine) = setup();
        let missing = PurchaseOrderId::new(depotflow_core::AggregateId::new());

        let err = engine
            .submit_order(world.company_id, missing, world.user)
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound)));
    }

    #[test]
    fn missing_status_configuration_is_reported_before_any_work() {
        let (world, engine) = setup();
        world.catalog.remove(
            world.company_id,
            Process::PurchaseOrder,
            depotflow_workflow::StatusCategory::OrderCreated,
        );
        let item = world.item(900);

        let err = engine
            .create_order(new_order(&world, &[(item, 1)], true))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Configuration(_))));
    }

    #[derive(Clone, Default)]
    struct LevelLog(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for LevelLog {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn rejections_are_logged_below_error() {
        let (world, engine) = setup();
        let item = world.item(900);
        let order = issued_order(&world, &engine, &[(item, 6)]);
        receive(&world, &engine, order.id_typed(), &[6]).unwrap();

        let log = LevelLog::default();
        let subscriber = Registry::default().with(log.clone());
        let err = tracing::subscriber::with_default(subscriber, || {
            engine
                .create_return(return_of(&world, order.id_typed(), item, 7))
                .unwrap_err()
        });
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

        let levels = log.0.lock().unwrap();
        assert!(levels.contains(&Level::WARN));
        assert!(!levels.contains(&Level::ERROR));
    }
}
