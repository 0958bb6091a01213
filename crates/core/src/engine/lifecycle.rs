//! The ticket lifecycle engine.
//!
//! All state changes go through here. Each operation reads the ticket,
//! checks authorization and transition legality against the state it read,
//! and hands the store a conditional write naming that state. Losing a race
//! surfaces as [`EngineError::StaleState`] (or [`EngineError::AlreadyDecided`]
//! for approval decisions), never as a double-applied transition.

use std::sync::Arc;

use chrono::Utc;

use crate::actor::{Actor, TechnicianDirectory};
use crate::metrics;
use crate::notify::{LifecycleEvent, NotifierHandle};
use crate::roster::ApprovalRoster;
use crate::sla;
use crate::ticket::{
    Category, CreateTicketRequest, DecisionOutcome, NewDecision, NewHistoryEntry, Priority, Ticket,
    TicketStatus, TicketStore, TransitionUpdate,
};

use super::EngineError;

/// Maximum accepted title length.
const MAX_TITLE_LEN: usize = 200;

/// Input for [`LifecycleEngine::submit`].
#[derive(Debug, Clone)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
}

/// Coordinates every ticket state change.
pub struct LifecycleEngine {
    store: Arc<dyn TicketStore>,
    roster: Arc<dyn ApprovalRoster>,
    directory: Arc<dyn TechnicianDirectory>,
    notifier: Option<NotifierHandle>,
    auto_assign: bool,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        roster: Arc<dyn ApprovalRoster>,
        directory: Arc<dyn TechnicianDirectory>,
    ) -> Self {
        Self {
            store,
            roster,
            directory,
            notifier: None,
            auto_assign: true,
        }
    }

    /// Attach a notifier handle; events are published after each applied
    /// transition.
    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Disable auto-assignment on the direct branch; tickets open
    /// unassigned instead.
    pub fn with_auto_assign(mut self, auto_assign: bool) -> Self {
        self.auto_assign = auto_assign;
        self
    }

    async fn publish(&self, event: LifecycleEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.emit(event).await;
        }
    }

    /// Create a ticket and route it into the matching branch.
    ///
    /// Categories with roster entries enter the approval chain at the first
    /// staffed level; all others open immediately, assigned to the active
    /// technician with the fewest open tickets.
    pub async fn submit(&self, draft: TicketDraft, actor: &Actor) -> Result<Ticket, EngineError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(EngineError::Validation(format!(
                "title longer than {} characters",
                MAX_TITLE_LEN
            )));
        }
        if draft.description.trim().is_empty() {
            return Err(EngineError::Validation(
                "description must not be empty".into(),
            ));
        }
        if draft.category.id <= 0 {
            return Err(EngineError::Validation("invalid category".into()));
        }

        let requires_approval = self.roster.requires_approval(draft.category.id)?;

        let ticket = self.store.create(CreateTicketRequest {
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            category_id: draft.category.id,
            department: draft.category.department.clone(),
            priority: draft.priority,
            requires_approval,
            created_by: actor.id,
        })?;

        self.publish(LifecycleEvent::Created {
            ticket_id: ticket.id,
            ticket_number: ticket.number.to_string(),
            created_by: actor.id,
            requires_approval,
        })
        .await;

        let ticket = if requires_approval {
            self.route_to_approval(ticket, actor).await?
        } else {
            self.route_to_direct(ticket, actor).await?
        };

        tracing::info!(
            ticket_id = ticket.id,
            number = %ticket.number,
            status = %ticket.status,
            "Ticket submitted"
        );
        Ok(ticket)
    }

    async fn route_to_approval(&self, ticket: Ticket, actor: &Actor) -> Result<Ticket, EngineError> {
        // Rosters may start above level 1; the chain begins at the lowest
        // staffed level.
        let first_level = self
            .roster
            .next_level_with_approvers(ticket.category_id, 0)?
            .unwrap_or(1);

        let mut update = TransitionUpdate::status_change(
            TicketStatus::PendingApproval,
            NewHistoryEntry::transition(
                actor.id,
                "Submitted for approval",
                ticket.status,
                TicketStatus::PendingApproval,
            ),
        );
        update.approval_level = Some(first_level);

        let ticket = self
            .store
            .apply_transition(ticket.id, ticket.workflow_state(), update)?;

        metrics::SUBMISSIONS_TOTAL
            .with_label_values(&["approval_chain"])
            .inc();
        self.publish(LifecycleEvent::ApprovalRequested {
            ticket_id: ticket.id,
            level: first_level,
        })
        .await;
        Ok(ticket)
    }

    async fn route_to_direct(&self, ticket: Ticket, actor: &Actor) -> Result<Ticket, EngineError> {
        let assignee = if self.auto_assign {
            self.least_loaded_technician()?
        } else {
            None
        };

        let mut update = TransitionUpdate::status_change(
            TicketStatus::Open,
            NewHistoryEntry::transition(
                actor.id,
                "Ticket opened",
                ticket.status,
                TicketStatus::Open,
            ),
        );
        if assignee.is_some() {
            update.assigned_to = Some(assignee);
        }

        let ticket = self
            .store
            .apply_transition(ticket.id, ticket.workflow_state(), update)?;

        metrics::SUBMISSIONS_TOTAL.with_label_values(&["direct"]).inc();
        if let Some(assigned_to) = assignee {
            metrics::AUTO_ASSIGNMENTS.inc();
            self.publish(LifecycleEvent::Assigned {
                ticket_id: ticket.id,
                assigned_to,
                assigned_by: actor.id,
            })
            .await;
        } else {
            // Unassigned openings still announce the transition.
            self.publish(LifecycleEvent::StatusChanged {
                ticket_id: ticket.id,
                old_status: TicketStatus::New.as_tag(),
                new_status: TicketStatus::Open.as_tag(),
                changed_by: actor.id,
            })
            .await;
        }
        Ok(ticket)
    }

    fn least_loaded_technician(&self) -> Result<Option<i64>, EngineError> {
        let mut best: Option<(i64, i64)> = None;
        for technician in self.directory.active_technicians() {
            let open = self.store.count_open_assigned(technician.user_id)?;
            match best {
                Some((_, best_open)) if open >= best_open => {}
                _ => best = Some((technician.user_id, open)),
            }
        }
        Ok(best.map(|(user_id, _)| user_id))
    }

    /// Record one approver's verdict at the ticket's current level.
    ///
    /// Exactly one decision per (ticket, level) is ever recorded; a caller
    /// that lost the race gets [`EngineError::AlreadyDecided`] and the
    /// ticket reflects the winner's verdict only.
    pub async fn decide(
        &self,
        ticket_id: i64,
        level: u32,
        actor: &Actor,
        outcome: DecisionOutcome,
        comment: Option<String>,
    ) -> Result<Ticket, EngineError> {
        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or(EngineError::NotFound(ticket_id))?;

        if !ticket.requires_approval || !ticket.status.in_approval_phase() {
            // A settled level reads as already decided even after the chain
            // has concluded.
            if ticket.requires_approval {
                let decided = self
                    .store
                    .decisions(ticket_id)?
                    .iter()
                    .any(|d| d.approval_level == level);
                if decided {
                    return Err(EngineError::AlreadyDecided { ticket_id, level });
                }
            }
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: "record an approval decision".to_string(),
            });
        }
        if level < ticket.current_approval_level {
            return Err(EngineError::AlreadyDecided { ticket_id, level });
        }
        if level > ticket.current_approval_level {
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: format!(
                    "decide level {} while level {} is active",
                    level, ticket.current_approval_level
                ),
            });
        }

        if !actor.is_admin()
            && !self
                .roster
                .is_eligible_decider(ticket.category_id, actor.id, level)?
        {
            return Err(EngineError::Unauthorized {
                actor: actor.id,
                action: format!("decide level {} of ticket {}", level, ticket_id),
            });
        }

        let decision = NewDecision {
            approval_level: level,
            outcome,
            decided_by: actor.id,
            comment: comment.clone(),
        };

        let result = match outcome {
            DecisionOutcome::Rejected => {
                let mut update = TransitionUpdate::status_change(
                    TicketStatus::Rejected,
                    NewHistoryEntry::transition(
                        actor.id,
                        note_with_comment(
                            format!("Rejected at level {}", level),
                            comment.as_deref(),
                        ),
                        ticket.status,
                        TicketStatus::Rejected,
                    ),
                );
                update.closed_at = Some(Some(Utc::now()));
                update.decision = Some(decision);
                self.store
                    .apply_transition(ticket_id, ticket.workflow_state(), update)
            }
            DecisionOutcome::Approved => {
                let next = self
                    .roster
                    .next_level_with_approvers(ticket.category_id, level)?;
                match next {
                    None => {
                        // Last staffed level; the chain is complete.
                        let mut update = TransitionUpdate::status_change(
                            TicketStatus::Approved,
                            NewHistoryEntry::transition(
                                actor.id,
                                note_with_comment(
                                    format!("Fully approved at level {}", level),
                                    comment.as_deref(),
                                ),
                                ticket.status,
                                TicketStatus::Approved,
                            ),
                        );
                        update.approved_by = Some(actor.id);
                        update.decision = Some(decision);
                        self.store
                            .apply_transition(ticket_id, ticket.workflow_state(), update)
                    }
                    Some(next_level) => {
                        let new_status = TicketStatus::ChainApproved { level };
                        let mut update = TransitionUpdate::status_change(
                            new_status,
                            NewHistoryEntry::transition(
                                actor.id,
                                note_with_comment(
                                    format!("Approved at level {}", level),
                                    comment.as_deref(),
                                ),
                                ticket.status,
                                new_status,
                            ),
                        );
                        update.approval_level = Some(next_level);
                        update.decision = Some(decision);
                        self.store
                            .apply_transition(ticket_id, ticket.workflow_state(), update)
                    }
                }
            }
        };

        let updated = result.map_err(|e| {
            // Any concurrent interference in the approval phase reads as the
            // level having been settled by someone else.
            match EngineError::from(e) {
                EngineError::StaleState(_) => {
                    metrics::STATE_CONFLICTS.inc();
                    EngineError::AlreadyDecided { ticket_id, level }
                }
                other => other,
            }
        })?;

        metrics::DECISIONS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
        metrics::TRANSITIONS_TOTAL
            .with_label_values(&[updated.status.as_tag().as_str()])
            .inc();

        match updated.status {
            TicketStatus::Rejected => {
                self.publish(LifecycleEvent::Rejected {
                    ticket_id,
                    level,
                    decided_by: actor.id,
                    comment,
                })
                .await;
            }
            TicketStatus::Approved => {
                metrics::CHAINS_COMPLETED.inc();
                self.publish(LifecycleEvent::FullyApproved {
                    ticket_id,
                    level,
                    decided_by: actor.id,
                })
                .await;
            }
            _ => {
                self.publish(LifecycleEvent::ApprovedAtLevel {
                    ticket_id,
                    level,
                    decided_by: actor.id,
                    next_level: updated.current_approval_level,
                })
                .await;
            }
        }

        tracing::info!(
            ticket_id,
            level,
            outcome = outcome.as_str(),
            status = %updated.status,
            "Approval decision recorded"
        );
        Ok(updated)
    }

    /// Advance one step along approved -> open -> pending -> solved -> closed.
    ///
    /// Resolving computes the SLA duration and persists it in the same write
    /// as the status change.
    pub async fn advance_status(
        &self,
        ticket_id: i64,
        actor: &Actor,
        target: TicketStatus,
        comment: Option<String>,
    ) -> Result<Ticket, EngineError> {
        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or(EngineError::NotFound(ticket_id))?;

        if !actor.is_admin() && ticket.assigned_to != Some(actor.id) {
            return Err(EngineError::Unauthorized {
                actor: actor.id,
                action: format!("advance ticket {}", ticket_id),
            });
        }

        if ticket.status.operational_successor() != Some(target) {
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: format!("advance to {}", target),
            });
        }

        let now = Utc::now();
        let mut update = TransitionUpdate::status_change(
            target,
            NewHistoryEntry::transition(
                actor.id,
                note_with_comment(format!("Status changed to {}", target), comment.as_deref()),
                ticket.status,
                target,
            ),
        );

        let mut resolved_sla = None;
        match target {
            TicketStatus::Solved => {
                let duration = sla::duration_hours(ticket.created_at, now);
                update.solved_at = Some(now);
                update.sla_duration_hours = Some(duration);
                resolved_sla = Some(duration);
            }
            TicketStatus::Closed => {
                update.closed_at = Some(Some(now));
            }
            _ => {}
        }

        let updated = self
            .store
            .apply_transition(ticket_id, ticket.workflow_state(), update)
            .map_err(|e| {
                let err = EngineError::from(e);
                if matches!(err, EngineError::StaleState(_)) {
                    metrics::STATE_CONFLICTS.inc();
                }
                err
            })?;

        metrics::TRANSITIONS_TOTAL
            .with_label_values(&[updated.status.as_tag().as_str()])
            .inc();

        if let Some(duration) = resolved_sla {
            metrics::RESOLUTION_HOURS
                .with_label_values(&[updated.priority.as_str()])
                .observe(duration);
            self.publish(LifecycleEvent::Resolved {
                ticket_id,
                resolved_by: actor.id,
                sla_duration_hours: duration,
            })
            .await;
        } else {
            self.publish(LifecycleEvent::StatusChanged {
                ticket_id,
                old_status: ticket.status.as_tag(),
                new_status: updated.status.as_tag(),
                changed_by: actor.id,
            })
            .await;
        }

        tracing::info!(
            ticket_id,
            from = %ticket.status,
            to = %updated.status,
            "Status advanced"
        );
        Ok(updated)
    }

    /// Withdraw a ticket before resolution.
    ///
    /// The creator may cancel while the ticket is still waiting (approval
    /// phase, fresh, or operational pending); an administrator may cancel
    /// from any pre-resolution state.
    pub async fn cancel(
        &self,
        ticket_id: i64,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<Ticket, EngineError> {
        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or(EngineError::NotFound(ticket_id))?;

        if !ticket.status.is_pre_resolution() {
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: "cancel".to_string(),
            });
        }

        let creator_may_cancel = ticket.created_by == actor.id
            && matches!(
                ticket.status,
                TicketStatus::New
                    | TicketStatus::PendingApproval
                    | TicketStatus::ChainApproved { .. }
                    | TicketStatus::Pending
            );
        if !actor.is_admin() && !creator_may_cancel {
            return Err(EngineError::Unauthorized {
                actor: actor.id,
                action: format!("cancel ticket {}", ticket_id),
            });
        }

        let mut update = TransitionUpdate::status_change(
            TicketStatus::Cancelled,
            NewHistoryEntry::transition(
                actor.id,
                note_with_comment("Ticket cancelled".to_string(), comment.as_deref()),
                ticket.status,
                TicketStatus::Cancelled,
            ),
        );
        update.closed_at = Some(Some(Utc::now()));

        let updated = self
            .store
            .apply_transition(ticket_id, ticket.workflow_state(), update)
            .map_err(|e| {
                let err = EngineError::from(e);
                if matches!(err, EngineError::StaleState(_)) {
                    metrics::STATE_CONFLICTS.inc();
                }
                err
            })?;

        metrics::TRANSITIONS_TOTAL
            .with_label_values(&["cancelled"])
            .inc();
        self.publish(LifecycleEvent::Cancelled {
            ticket_id,
            cancelled_by: actor.id,
        })
        .await;

        tracing::info!(ticket_id, by = actor.id, "Ticket cancelled");
        Ok(updated)
    }

    /// Pull a closed or cancelled ticket back into the operational flow.
    ///
    /// Administrators only. The closed timestamp is cleared; a previously
    /// recorded resolution time stays until the next resolution overwrites
    /// it.
    pub async fn reopen(
        &self,
        ticket_id: i64,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<Ticket, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Unauthorized {
                actor: actor.id,
                action: format!("reopen ticket {}", ticket_id),
            });
        }

        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or(EngineError::NotFound(ticket_id))?;

        if !matches!(
            ticket.status,
            TicketStatus::Closed | TicketStatus::Cancelled
        ) {
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: "reopen".to_string(),
            });
        }

        let mut update = TransitionUpdate::status_change(
            TicketStatus::Pending,
            NewHistoryEntry::transition(
                actor.id,
                note_with_comment("Ticket reopened".to_string(), comment.as_deref()),
                ticket.status,
                TicketStatus::Pending,
            ),
        );
        update.closed_at = Some(None);

        let updated = self
            .store
            .apply_transition(ticket_id, ticket.workflow_state(), update)
            .map_err(|e| {
                let err = EngineError::from(e);
                if matches!(err, EngineError::StaleState(_)) {
                    metrics::STATE_CONFLICTS.inc();
                }
                err
            })?;

        metrics::REOPENS_TOTAL.inc();
        metrics::TRANSITIONS_TOTAL
            .with_label_values(&["pending"])
            .inc();
        self.publish(LifecycleEvent::Reopened {
            ticket_id,
            reopened_by: actor.id,
        })
        .await;

        tracing::info!(ticket_id, by = actor.id, "Ticket reopened");
        Ok(updated)
    }

    /// Hand a ticket to a technician without a status change.
    ///
    /// Administrators may reassign anything; a technician may pick up an
    /// unassigned ticket for themselves.
    pub async fn assign(
        &self,
        ticket_id: i64,
        technician_id: i64,
        actor: &Actor,
    ) -> Result<Ticket, EngineError> {
        let ticket = self
            .store
            .get(ticket_id)?
            .ok_or(EngineError::NotFound(ticket_id))?;

        if ticket.status.is_terminal() || ticket.status.in_approval_phase() {
            return Err(EngineError::InvalidTransition {
                ticket_id,
                status: ticket.status.to_string(),
                action: "assign".to_string(),
            });
        }

        let self_pickup = actor.id == technician_id && ticket.assigned_to.is_none();
        if !actor.is_admin() && !self_pickup {
            return Err(EngineError::Unauthorized {
                actor: actor.id,
                action: format!("assign ticket {}", ticket_id),
            });
        }

        let updated = self.store.assign(
            ticket_id,
            Some(technician_id),
            NewHistoryEntry::note(actor.id, format!("Assigned to user {}", technician_id)),
        )?;

        self.publish(LifecycleEvent::Assigned {
            ticket_id,
            assigned_to: technician_id,
            assigned_by: actor.id,
        })
        .await;

        tracing::info!(ticket_id, technician_id, "Ticket assigned");
        Ok(updated)
    }

    /// Append a free-form comment to the ticket's history ledger.
    pub fn comment(
        &self,
        ticket_id: i64,
        actor: &Actor,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EngineError::Validation("comment must not be empty".into()));
        }
        self.store
            .append_history(ticket_id, NewHistoryEntry::note(actor.id, text))?;
        Ok(())
    }
}

fn note_with_comment(base: String, comment: Option<&str>) -> String {
    match comment {
        Some(c) if !c.trim().is_empty() => format!("{}: {}", base, c.trim()),
        _ => base,
    }
}
