//! Lifecycle engine integration tests.
//!
//! These tests drive complete workflows through the engine:
//! approval chains, direct assignment, the operational sequence, cancel and
//! reopen, and the concurrency guarantees around approval decisions.

use std::sync::Arc;

use tempfile::TempDir;

use deskflow_core::{
    engine::{EngineError, LifecycleEngine, TicketDraft},
    notify::create_notifier,
    testing::{fixtures, FixedRoster, RecordingSink, StaticDirectory},
    ticket::{Category, DecisionOutcome, Priority, SqliteTicketStore, TicketStatus, TicketStore},
    LifecycleEvent,
};

/// Test helper bundling an engine with its backing store.
struct TestHarness {
    store: Arc<SqliteTicketStore>,
    engine: LifecycleEngine,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(roster: FixedRoster, directory: StaticDirectory) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let store =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let engine = LifecycleEngine::new(
            Arc::clone(&store) as Arc<dyn TicketStore>,
            Arc::new(roster),
            Arc::new(directory),
        );

        Self {
            store,
            engine,
            _temp_dir: temp_dir,
        }
    }

    /// Two-level approval chain on the hardware category: 20 decides level 1,
    /// 21 decides level 2.
    fn with_hardware_chain() -> Self {
        Self::new(
            FixedRoster::empty().with_entry(1, 20, 1).with_entry(1, 21, 2),
            StaticDirectory::empty().with_technician(40, "dana"),
        )
    }

    fn direct_only() -> Self {
        Self::new(
            FixedRoster::empty(),
            StaticDirectory::empty()
                .with_technician(40, "dana")
                .with_technician(41, "lee"),
        )
    }
}

fn hardware_draft() -> TicketDraft {
    fixtures::draft(fixtures::hardware_category())
}

// ============================================================================
// Submission and branching
// ============================================================================

#[tokio::test]
async fn approval_category_enters_chain_at_level_one() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    assert_eq!(ticket.status, TicketStatus::PendingApproval);
    assert_eq!(ticket.current_approval_level, 1);
    assert!(ticket.requires_approval);
    assert!(ticket.assigned_to.is_none());
    assert!(ticket.closed_at.is_none());
}

#[tokio::test]
async fn rosterless_category_opens_immediately_with_assignee() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();

    assert_eq!(ticket.status, TicketStatus::Open);
    assert!(!ticket.requires_approval);
    assert!(ticket.assigned_to.is_some());
}

#[tokio::test]
async fn auto_assignment_picks_least_loaded_technician() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);
    let draft = || fixtures::draft(fixtures::facilities_category());

    let first = harness.engine.submit(draft(), &requester).await.unwrap();
    let second = harness.engine.submit(draft(), &requester).await.unwrap();

    // Two technicians, two tickets: each gets one.
    assert_ne!(first.assigned_to, second.assigned_to);

    // Resolve the first technician's ticket; the next submission goes to
    // whoever now has fewer open tickets.
    let tech = fixtures::technician(first.assigned_to.unwrap());
    harness
        .engine
        .advance_status(first.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    harness
        .engine
        .advance_status(first.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();

    let third = harness.engine.submit(draft(), &requester).await.unwrap();
    assert_eq!(third.assigned_to, first.assigned_to);
}

#[tokio::test]
async fn submit_rejects_blank_input() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    let mut draft = hardware_draft();
    draft.title = "   ".to_string();
    let result = harness.engine.submit(draft, &requester).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let mut draft = hardware_draft();
    draft.description = String::new();
    let result = harness.engine.submit(draft, &requester).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn frozen_branch_ignores_later_roster_changes() {
    // The branch is decided at submission; this harness simulates a roster
    // that was emptied afterwards by using a roster that never had entries
    // but a ticket persisted with requires_approval = true.
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    assert!(ticket.requires_approval);

    let stored = harness.store.get(ticket.id).unwrap().unwrap();
    assert!(stored.requires_approval);
    assert_eq!(stored.status, TicketStatus::PendingApproval);
}

// ============================================================================
// Approval chain
// ============================================================================

#[tokio::test]
async fn two_level_chain_completes_in_order() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);
    let level1 = fixtures::approver(20);
    let level2 = fixtures::approver(21);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    // Level 1 approves: level 1 is complete, level 2 becomes active.
    let ticket = harness
        .engine
        .decide(ticket.id, 1, &level1, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::ChainApproved { level: 1 });
    assert_eq!(ticket.status.as_tag(), "level1_approved");
    assert_eq!(ticket.current_approval_level, 2);
    assert!(ticket.approved_by.is_none());
    assert!(ticket.closed_at.is_none());

    // Level 2 approves: the chain is complete.
    let ticket = harness
        .engine
        .decide(ticket.id, 2, &level2, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);
    assert_eq!(ticket.approved_by, Some(21));
    // Full approval is not a terminal outcome; the ticket stays open for
    // the operational branch.
    assert!(ticket.closed_at.is_none());

    let decisions = harness.store.decisions(ticket.id).unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].approval_level, 1);
    assert_eq!(decisions[0].decided_by, 20);
    assert_eq!(decisions[1].approval_level, 2);
    assert_eq!(decisions[1].decided_by, 21);
}

#[tokio::test]
async fn chain_skips_unstaffed_levels() {
    let harness = TestHarness::new(
        FixedRoster::empty().with_entry(1, 20, 1).with_entry(1, 22, 3),
        StaticDirectory::empty(),
    );
    let requester = fixtures::requester(10);
    let level1 = fixtures::approver(20);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    let ticket = harness
        .engine
        .decide(ticket.id, 1, &level1, DecisionOutcome::Approved, None)
        .await
        .unwrap();

    // No approvers at level 2; level 3 is next.
    assert_eq!(ticket.current_approval_level, 3);
    assert_eq!(ticket.status, TicketStatus::ChainApproved { level: 1 });
}

#[tokio::test]
async fn chain_starts_at_lowest_staffed_level() {
    // Rosters need not be staffed from level 1.
    let harness = TestHarness::new(
        FixedRoster::empty().with_entry(1, 25, 2).with_entry(1, 26, 3),
        StaticDirectory::empty(),
    );
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::PendingApproval);
    assert_eq!(ticket.current_approval_level, 2);

    let ticket = harness
        .engine
        .decide(ticket.id, 2, &fixtures::approver(25), DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::ChainApproved { level: 2 });
    assert_eq!(ticket.current_approval_level, 3);

    let ticket = harness
        .engine
        .decide(ticket.id, 3, &fixtures::approver(26), DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);
}

#[tokio::test]
async fn rejection_is_terminal_at_any_level() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);
    let level1 = fixtures::approver(20);
    let level2 = fixtures::approver(21);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    harness
        .engine
        .decide(ticket.id, 1, &level1, DecisionOutcome::Approved, None)
        .await
        .unwrap();

    let ticket = harness
        .engine
        .decide(
            ticket.id,
            2,
            &level2,
            DecisionOutcome::Rejected,
            Some("over budget".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Rejected);
    assert!(ticket.closed_at.is_some());

    // No further decisions or advances are possible.
    let result = harness
        .engine
        .decide(ticket.id, 2, &level2, DecisionOutcome::Approved, None)
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyDecided { .. })));

    let result = harness
        .engine
        .advance_status(ticket.id, &fixtures::admin(), TicketStatus::Open, None)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

    // Rejected tickets are not reopenable.
    let result = harness
        .engine
        .reopen(ticket.id, &fixtures::admin(), None)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn decide_enforces_level_and_eligibility() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);
    let level1 = fixtures::approver(20);
    let level2 = fixtures::approver(21);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    // Level 2 is not active yet.
    let result = harness
        .engine
        .decide(ticket.id, 2, &level2, DecisionOutcome::Approved, None)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

    // The level 2 approver holds no grant at level 1.
    let result = harness
        .engine
        .decide(ticket.id, 1, &level2, DecisionOutcome::Approved, None)
        .await;
    assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

    // After level 1 settles, a repeat attempt at level 1 is already decided.
    harness
        .engine
        .decide(ticket.id, 1, &level1, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    let result = harness
        .engine
        .decide(ticket.id, 1, &level1, DecisionOutcome::Approved, None)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::AlreadyDecided { level: 1, .. })
    ));
}

#[tokio::test]
async fn admin_may_decide_without_roster_entry() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    let ticket = harness
        .engine
        .decide(ticket.id, 1, &admin, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.current_approval_level, 2);
}

#[tokio::test]
async fn concurrent_decisions_record_exactly_one() {
    let harness = TestHarness::new(
        // Two approvers share level 1 of a two-level chain.
        FixedRoster::empty()
            .with_entry(1, 20, 1)
            .with_entry(1, 22, 1)
            .with_entry(1, 21, 2),
        StaticDirectory::empty(),
    );
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    let engine = Arc::new(harness.engine);
    let a = {
        let engine = Arc::clone(&engine);
        let actor = fixtures::approver(20);
        let id = ticket.id;
        tokio::spawn(async move {
            engine
                .decide(id, 1, &actor, DecisionOutcome::Approved, None)
                .await
        })
    };
    let b = {
        let engine = Arc::clone(&engine);
        let actor = fixtures::approver(22);
        let id = ticket.id;
        tokio::spawn(async move {
            engine
                .decide(id, 1, &actor, DecisionOutcome::Rejected, None)
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    let already = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::AlreadyDecided { .. })))
        .count();
    assert_eq!(ok_count, 1, "exactly one decision must win");
    assert_eq!(already, 1, "the loser must observe the settled level");

    // Exactly one decision row; the ticket reflects the winner's verdict.
    let decisions = harness.store.decisions(ticket.id).unwrap();
    assert_eq!(decisions.len(), 1);

    let stored = harness.store.get(ticket.id).unwrap().unwrap();
    match decisions[0].outcome {
        DecisionOutcome::Approved => {
            assert_eq!(stored.status, TicketStatus::ChainApproved { level: 1 });
            assert_eq!(stored.current_approval_level, 2);
        }
        DecisionOutcome::Rejected => {
            assert_eq!(stored.status, TicketStatus::Rejected);
        }
    }
}

// ============================================================================
// Operational branch
// ============================================================================

#[tokio::test]
async fn operational_sequence_runs_to_closed() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(ticket.assigned_to.unwrap());

    let ticket = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);

    let ticket = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Solved);
    assert!(ticket.solved_at.is_some());
    assert!(ticket.sla_duration_hours.is_some());
    assert!(ticket.closed_at.is_none());

    let ticket = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Closed, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Closed);
    assert!(ticket.closed_at.is_some());

    // One creation entry plus one entry per applied transition.
    let history = harness.store.history(ticket.id).unwrap();
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn advance_rejects_skips_and_strangers() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(ticket.assigned_to.unwrap());

    // Open cannot jump straight to solved.
    let result = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

    // A technician who is not the assignee cannot advance.
    let stranger = fixtures::technician(99);
    let result = harness
        .engine
        .advance_status(ticket.id, &stranger, TicketStatus::Pending, None)
        .await;
    assert!(matches!(result, Err(EngineError::Unauthorized { .. })));
}

#[tokio::test]
async fn approved_ticket_enters_operational_branch() {
    let harness = TestHarness::new(
        FixedRoster::empty().with_entry(1, 20, 1),
        StaticDirectory::empty().with_technician(40, "dana"),
    );
    let requester = fixtures::requester(10);
    let approver = fixtures::approver(20);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    let ticket = harness
        .engine
        .decide(ticket.id, 1, &approver, DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);

    let ticket = harness
        .engine
        .advance_status(ticket.id, &admin, TicketStatus::Open, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);

    // Hand it to a technician, who then works it.
    let ticket = harness.engine.assign(ticket.id, 40, &admin).await.unwrap();
    assert_eq!(ticket.assigned_to, Some(40));

    let tech = fixtures::technician(40);
    let ticket = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
}

// ============================================================================
// Cancel and reopen
// ============================================================================

#[tokio::test]
async fn creator_cancels_while_awaiting_approval() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();

    let ticket = harness
        .engine
        .cancel(ticket.id, &requester, Some("no longer needed".to_string()))
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Cancelled);
    assert!(ticket.closed_at.is_some());
}

#[tokio::test]
async fn cancel_authorization_boundaries() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);
    let other = fixtures::requester(11);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();

    // A different user cannot cancel.
    let result = harness.engine.cancel(ticket.id, &other, None).await;
    assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

    // The creator cannot cancel an open ticket being worked; only an admin.
    let result = harness.engine.cancel(ticket.id, &requester, None).await;
    assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

    let ticket = harness.engine.cancel(ticket.id, &admin, None).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Cancelled);

    // Cancelled is terminal; a second cancel fails.
    let result = harness.engine.cancel(ticket.id, &admin, None).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn cancel_impossible_after_resolution() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(ticket.assigned_to.unwrap());

    harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();

    let result = harness.engine.cancel(ticket.id, &admin, None).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn reopen_clears_closed_and_keeps_stale_sla() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(ticket.assigned_to.unwrap());

    harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    let solved = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();
    let first_sla = solved.sla_duration_hours.unwrap();
    harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Closed, None)
        .await
        .unwrap();

    // Only an admin can reopen.
    let result = harness.engine.reopen(ticket.id, &tech, None).await;
    assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

    let reopened = harness.engine.reopen(ticket.id, &admin, None).await.unwrap();
    assert_eq!(reopened.status, TicketStatus::Pending);
    assert!(reopened.closed_at.is_none());
    // The recorded resolution is stale but retained until re-solved.
    assert_eq!(reopened.sla_duration_hours, Some(first_sla));
    assert!(reopened.solved_at.is_some());

    // Re-solving overwrites the resolution record.
    let resolved = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();
    assert!(resolved.sla_duration_hours.is_some());
    assert!(resolved.solved_at > solved.solved_at);
}

#[tokio::test]
async fn reopen_works_for_cancelled_tickets() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);
    let admin = fixtures::admin();

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    harness.engine.cancel(ticket.id, &admin, None).await.unwrap();

    let reopened = harness.engine.reopen(ticket.id, &admin, None).await.unwrap();
    assert_eq!(reopened.status, TicketStatus::Pending);
    assert!(reopened.closed_at.is_none());
}

// ============================================================================
// Closed-timestamp invariant
// ============================================================================

#[tokio::test]
async fn closed_timestamp_tracks_terminal_statuses_exactly() {
    let harness = TestHarness::with_hardware_chain();
    let requester = fixtures::requester(10);
    let admin = fixtures::admin();

    // Full approval does not set the closed timestamp.
    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    harness
        .engine
        .decide(ticket.id, 1, &fixtures::approver(20), DecisionOutcome::Approved, None)
        .await
        .unwrap();
    let approved = harness
        .engine
        .decide(ticket.id, 2, &fixtures::approver(21), DecisionOutcome::Approved, None)
        .await
        .unwrap();
    assert_eq!(approved.status, TicketStatus::Approved);
    assert!(approved.closed_at.is_none());

    // Rejection does.
    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    let rejected = harness
        .engine
        .decide(ticket.id, 1, &fixtures::approver(20), DecisionOutcome::Rejected, None)
        .await
        .unwrap();
    assert!(rejected.closed_at.is_some());

    // Cancellation does.
    let ticket = harness
        .engine
        .submit(hardware_draft(), &requester)
        .await
        .unwrap();
    let cancelled = harness.engine.cancel(ticket.id, &admin, None).await.unwrap();
    assert!(cancelled.closed_at.is_some());
}

// ============================================================================
// Event publication
// ============================================================================

#[tokio::test]
async fn events_published_for_each_applied_transition() {
    let sink = Arc::new(RecordingSink::new());
    let (handle, router) =
        create_notifier(Arc::clone(&sink) as Arc<dyn deskflow_core::NotificationSink>, 64);
    let router_handle = tokio::spawn(router.run());

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTicketStore::new(&temp_dir.path().join("test.db")).unwrap());
    let engine = LifecycleEngine::new(
        Arc::clone(&store) as Arc<dyn TicketStore>,
        Arc::new(FixedRoster::empty()),
        Arc::new(StaticDirectory::empty().with_technician(40, "dana")),
    )
    .with_notifier(handle.clone());

    let requester = fixtures::requester(10);
    let ticket = engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(40);

    engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();
    engine
        .advance_status(ticket.id, &tech, TicketStatus::Closed, None)
        .await
        .unwrap();

    drop(handle);
    drop(engine);
    router_handle.await.unwrap();

    assert_eq!(
        sink.event_types(),
        vec![
            "created",
            "assigned",
            "status_changed",
            "resolved",
            "status_changed"
        ]
    );

    let events = sink.events();
    assert!(events.iter().all(|e| e.ticket_id() == ticket.id));
    assert!(matches!(
        &events[3],
        LifecycleEvent::Resolved { resolved_by: 40, .. }
    ));
}

#[tokio::test]
async fn unassigned_opening_still_publishes_an_event() {
    let sink = Arc::new(RecordingSink::new());
    let (handle, router) =
        create_notifier(Arc::clone(&sink) as Arc<dyn deskflow_core::NotificationSink>, 64);
    let router_handle = tokio::spawn(router.run());

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTicketStore::new(&temp_dir.path().join("test.db")).unwrap());
    let engine = LifecycleEngine::new(
        Arc::clone(&store) as Arc<dyn TicketStore>,
        Arc::new(FixedRoster::empty()),
        Arc::new(StaticDirectory::empty().with_technician(40, "dana")),
    )
    .with_auto_assign(false)
    .with_notifier(handle.clone());

    let ticket = engine
        .submit(
            fixtures::draft(fixtures::facilities_category()),
            &fixtures::requester(10),
        )
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert!(ticket.assigned_to.is_none());

    drop(handle);
    drop(engine);
    router_handle.await.unwrap();

    // The opening transition is announced even with nobody assigned.
    assert_eq!(sink.event_types(), vec!["created", "status_changed"]);
    assert!(matches!(
        &sink.events()[1],
        LifecycleEvent::StatusChanged { old_status, new_status, .. }
            if old_status == "new" && new_status == "open"
    ));
}

#[tokio::test]
async fn approval_chain_event_sequence() {
    let sink = Arc::new(RecordingSink::new());
    let (handle, router) =
        create_notifier(Arc::clone(&sink) as Arc<dyn deskflow_core::NotificationSink>, 64);
    let router_handle = tokio::spawn(router.run());

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTicketStore::new(&temp_dir.path().join("test.db")).unwrap());
    let engine = LifecycleEngine::new(
        Arc::clone(&store) as Arc<dyn TicketStore>,
        Arc::new(
            FixedRoster::empty().with_entry(1, 20, 1).with_entry(1, 21, 2),
        ),
        Arc::new(StaticDirectory::empty()),
    )
    .with_notifier(handle.clone());

    let requester = fixtures::requester(10);
    let ticket = engine
        .submit(fixtures::draft(Category::new(1, "Hardware", "IT")), &requester)
        .await
        .unwrap();
    engine
        .decide(ticket.id, 1, &fixtures::approver(20), DecisionOutcome::Approved, None)
        .await
        .unwrap();
    engine
        .decide(ticket.id, 2, &fixtures::approver(21), DecisionOutcome::Approved, None)
        .await
        .unwrap();

    drop(handle);
    drop(engine);
    router_handle.await.unwrap();

    assert_eq!(
        sink.event_types(),
        vec![
            "created",
            "approval_requested",
            "approved_at_level",
            "fully_approved"
        ]
    );
}

// ============================================================================
// SLA and priority details
// ============================================================================

#[tokio::test]
async fn fresh_ticket_resolves_with_zero_hours() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    let ticket = harness
        .engine
        .submit(fixtures::draft(fixtures::facilities_category()), &requester)
        .await
        .unwrap();
    let tech = fixtures::technician(ticket.assigned_to.unwrap());

    harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Pending, None)
        .await
        .unwrap();
    let solved = harness
        .engine
        .advance_status(ticket.id, &tech, TicketStatus::Solved, None)
        .await
        .unwrap();

    // Sub-minute resolution truncates to zero.
    assert_eq!(solved.sla_duration_hours, Some(0.0));
}

#[tokio::test]
async fn listing_orders_by_priority() {
    let harness = TestHarness::direct_only();
    let requester = fixtures::requester(10);

    for priority in [Priority::Low, Priority::Urgent, Priority::Medium] {
        let mut draft = fixtures::draft(fixtures::facilities_category());
        draft.priority = priority;
        harness.engine.submit(draft, &requester).await.unwrap();
    }

    let tickets = harness
        .store
        .list(&deskflow_core::ticket::TicketFilter::new())
        .unwrap();
    assert_eq!(tickets[0].priority, Priority::Urgent);
    assert_eq!(tickets[2].priority, Priority::Low);
}
