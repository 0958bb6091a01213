use serde::{Deserialize, Serialize};

/// Lifecycle events published after a state change has been persisted.
///
/// Consumers see events only for transitions that actually landed; a
/// conflicting write that lost the race emits nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A ticket was created and entered the workflow.
    Created {
        ticket_id: i64,
        ticket_number: String,
        created_by: i64,
        requires_approval: bool,
    },

    /// A ticket was assigned to a technician.
    Assigned {
        ticket_id: i64,
        assigned_to: i64,
        assigned_by: i64,
    },

    /// A ticket entered the approval chain and awaits its first decision.
    ApprovalRequested { ticket_id: i64, level: u32 },

    /// An intermediate level approved; the chain moved to the next level.
    ApprovedAtLevel {
        ticket_id: i64,
        level: u32,
        decided_by: i64,
        next_level: u32,
    },

    /// The final level approved; the ticket left the approval phase.
    FullyApproved {
        ticket_id: i64,
        level: u32,
        decided_by: i64,
    },

    /// An approver rejected the ticket. Terminal.
    Rejected {
        ticket_id: i64,
        level: u32,
        decided_by: i64,
        comment: Option<String>,
    },

    /// An operational status advance (open, pending, solved, closed).
    StatusChanged {
        ticket_id: i64,
        old_status: String,
        new_status: String,
        changed_by: i64,
    },

    /// The ticket was marked solved and its resolution time recorded.
    Resolved {
        ticket_id: i64,
        resolved_by: i64,
        sla_duration_hours: f64,
    },

    /// The requester or an administrator cancelled the ticket. Terminal.
    Cancelled { ticket_id: i64, cancelled_by: i64 },

    /// An administrator reopened a terminal ticket back into the
    /// operational flow.
    Reopened { ticket_id: i64, reopened_by: i64 },
}

impl LifecycleEvent {
    /// Event type as a stable string for logging and routing.
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::Created { .. } => "created",
            LifecycleEvent::Assigned { .. } => "assigned",
            LifecycleEvent::ApprovalRequested { .. } => "approval_requested",
            LifecycleEvent::ApprovedAtLevel { .. } => "approved_at_level",
            LifecycleEvent::FullyApproved { .. } => "fully_approved",
            LifecycleEvent::Rejected { .. } => "rejected",
            LifecycleEvent::StatusChanged { .. } => "status_changed",
            LifecycleEvent::Resolved { .. } => "resolved",
            LifecycleEvent::Cancelled { .. } => "cancelled",
            LifecycleEvent::Reopened { .. } => "reopened",
        }
    }

    /// The ticket this event concerns.
    pub fn ticket_id(&self) -> i64 {
        match self {
            LifecycleEvent::Created { ticket_id, .. }
            | LifecycleEvent::Assigned { ticket_id, .. }
            | LifecycleEvent::ApprovalRequested { ticket_id, .. }
            | LifecycleEvent::ApprovedAtLevel { ticket_id, .. }
            | LifecycleEvent::FullyApproved { ticket_id, .. }
            | LifecycleEvent::Rejected { ticket_id, .. }
            | LifecycleEvent::StatusChanged { ticket_id, .. }
            | LifecycleEvent::Resolved { ticket_id, .. }
            | LifecycleEvent::Cancelled { ticket_id, .. }
            | LifecycleEvent::Reopened { ticket_id, .. } => *ticket_id,
        }
    }
}
