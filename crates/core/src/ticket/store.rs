//! Ticket storage trait and supporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Priority, Ticket, TicketNumber, TicketStatus, WorkflowState};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ticket not found: {0}")]
    NotFound(i64),

    /// The conditional write named a (status, level) pair the row no longer
    /// holds; another transition was applied first. Nothing was written.
    #[error("Ticket {ticket_id} no longer matches expected state {expected}")]
    Conflict { ticket_id: i64, expected: String },

    /// A decision already exists for this (ticket, level). Nothing was written.
    #[error("Level {level} of ticket {ticket_id} already holds a decision")]
    DuplicateDecision { ticket_id: i64, level: u32 },

    #[error("Database error: {0}")]
    Database(String),
}

/// Verdict of a single approval decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Approved => "approved",
            DecisionOutcome::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(DecisionOutcome::Approved),
            "rejected" => Some(DecisionOutcome::Rejected),
            _ => None,
        }
    }
}

/// One approver's immutable verdict at one level of one ticket.
///
/// At most one of these exists per (ticket, level); the store enforces it
/// with a unique index even under concurrent submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub id: i64,
    pub ticket_id: i64,
    pub approval_level: u32,
    pub outcome: DecisionOutcome,
    pub decided_by: i64,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Decision payload recorded atomically with a transition.
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub approval_level: u32,
    pub outcome: DecisionOutcome,
    pub decided_by: i64,
    pub comment: Option<String>,
}

/// One entry in a ticket's append-only history ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub actor_id: i64,
    pub note: String,
    /// Set for state-changing entries, absent for plain notes.
    pub old_status: Option<TicketStatus>,
    pub new_status: Option<TicketStatus>,
    pub created_at: DateTime<Utc>,
}

/// History payload for an appended entry.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub actor_id: i64,
    pub note: String,
    pub old_status: Option<TicketStatus>,
    pub new_status: Option<TicketStatus>,
}

impl NewHistoryEntry {
    /// Entry describing an applied status transition.
    pub fn transition(
        actor_id: i64,
        note: impl Into<String>,
        old: TicketStatus,
        new: TicketStatus,
    ) -> Self {
        Self {
            actor_id,
            note: note.into(),
            old_status: Some(old),
            new_status: Some(new),
        }
    }

    /// Free-form entry with no status change (assignment, comment).
    pub fn note(actor_id: i64, note: impl Into<String>) -> Self {
        Self {
            actor_id,
            note: note.into(),
            old_status: None,
            new_status: None,
        }
    }
}

/// Request to create a new ticket.
///
/// The ticket number is generated inside the store so that a collision with
/// an existing number triggers regeneration rather than a failed insert.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub department: String,
    pub priority: Priority,
    pub requires_approval: bool,
    pub created_by: i64,
}

/// The atomic state-changing write.
///
/// Everything here is applied in one transaction guarded by the expected
/// (status, level) pair: the status write, the optional decision record and
/// the history entry either all land or none do.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub new_status: TicketStatus,
    /// New approval level; `None` leaves the column untouched.
    pub approval_level: Option<u32>,
    /// `Some(value)` writes the assignee column (including `Some(None)` to
    /// clear it); `None` leaves it untouched.
    pub assigned_to: Option<Option<i64>>,
    /// Final approver, written once on full approval.
    pub approved_by: Option<i64>,
    pub solved_at: Option<DateTime<Utc>>,
    /// `Some(Some(..))` sets the closed timestamp, `Some(None)` clears it.
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub sla_duration_hours: Option<f64>,
    pub decision: Option<NewDecision>,
    pub history: NewHistoryEntry,
}

impl TransitionUpdate {
    /// Minimal update: status change plus its history entry.
    pub fn status_change(new_status: TicketStatus, history: NewHistoryEntry) -> Self {
        Self {
            new_status,
            approval_level: None,
            assigned_to: None,
            approved_by: None,
            solved_at: None,
            closed_at: None,
            sla_duration_hours: None,
            decision: None,
            history,
        }
    }
}

/// Filter for querying tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Filter by status tag (e.g. `"pending_approval"`).
    pub status: Option<String>,
    pub created_by: Option<i64>,
    pub assigned_to: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            created_by: None,
            assigned_to: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_created_by(mut self, created_by: i64) -> Self {
        self.created_by = Some(created_by);
        self
    }

    pub fn with_assigned_to(mut self, assigned_to: i64) -> Self {
        self.assigned_to = Some(assigned_to);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for ticket storage backends.
///
/// Tickets are never physically deleted; terminal outcomes are ordinary
/// status transitions and the history ledger survives them.
pub trait TicketStore: Send + Sync {
    /// Create a new ticket in status `new` with a fresh unique number.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, StoreError>;

    /// Get a ticket by numeric id.
    fn get(&self, id: i64) -> Result<Option<Ticket>, StoreError>;

    /// Get a ticket by its human-facing number.
    fn get_by_number(&self, number: &TicketNumber) -> Result<Option<Ticket>, StoreError>;

    /// List tickets matching the filter, most urgent first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Count tickets matching the filter.
    fn count(&self, filter: &TicketFilter) -> Result<i64, StoreError>;

    /// Number of non-terminal, unresolved tickets assigned to a user.
    /// Used to pick the least-loaded technician at submission.
    fn count_open_assigned(&self, user_id: i64) -> Result<i64, StoreError>;

    /// Apply a guarded state transition.
    ///
    /// The write only lands if the persisted (status, approval level) pair
    /// still equals `expected`; otherwise nothing is written and
    /// [`StoreError::Conflict`] is returned. A duplicate decision insert
    /// rolls the whole update back with [`StoreError::DuplicateDecision`].
    fn apply_transition(
        &self,
        id: i64,
        expected: WorkflowState,
        update: TransitionUpdate,
    ) -> Result<Ticket, StoreError>;

    /// Reassign a ticket without a status change, appending a history note.
    fn assign(
        &self,
        id: i64,
        assigned_to: Option<i64>,
        history: NewHistoryEntry,
    ) -> Result<Ticket, StoreError>;

    /// Append a free-form history entry (comment) with no state change.
    fn append_history(&self, id: i64, entry: NewHistoryEntry) -> Result<(), StoreError>;

    /// Full history ledger for a ticket, oldest first.
    fn history(&self, id: i64) -> Result<Vec<HistoryEntry>, StoreError>;

    /// All recorded approval decisions for a ticket, by level.
    fn decisions(&self, id: i64) -> Result<Vec<ApprovalDecision>, StoreError>;
}
