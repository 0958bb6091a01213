//! Core ticket data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TicketNumber;

// ============================================================================
// Classification
// ============================================================================

/// Ticket priority, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Category a ticket is filed under.
///
/// Category management is outside the engine; the caller passes the selected
/// category as a value. The department is copied onto the ticket at creation
/// and frozen there, so later category edits do not move existing tickets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub department: String,
}

impl Category {
    pub fn new(id: i64, name: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            department: department.into(),
        }
    }
}

// ============================================================================
// Status domain
// ============================================================================

/// Ticket status.
///
/// Two branches share one status domain:
///
/// ```text
/// approval branch:  New -> PendingApproval -> ChainApproved{1} -> ... -> Approved
///                             |                    |
///                             v                    v
///                          Rejected            Rejected
///
/// operational branch (entered from Approved, or directly for categories
/// with no roster entries):  Open -> Pending -> Solved -> Closed
/// ```
///
/// `Rejected`, `Cancelled` and `Closed` are terminal; the only way out of a
/// terminal status is an administrator reopen back to `Pending`.
///
/// `ChainApproved { level }` means "level `level` has been decided, the next
/// roster level is now active". A ticket at `ChainApproved { 1 }` with
/// `current_approval_level = 2` is waiting on its level 2 approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    New,
    PendingApproval,
    ChainApproved { level: u32 },
    Approved,
    Rejected,
    Cancelled,
    Open,
    Pending,
    Solved,
    Closed,
}

impl TicketStatus {
    /// Returns true if no further transition is legal except admin reopen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Rejected | TicketStatus::Cancelled | TicketStatus::Closed
        )
    }

    /// Returns true while approval decisions may still be recorded.
    pub fn in_approval_phase(&self) -> bool {
        matches!(
            self,
            TicketStatus::PendingApproval | TicketStatus::ChainApproved { .. }
        )
    }

    /// Returns true before the ticket has been resolved or terminated.
    /// This is the window in which cancellation is legal.
    pub fn is_pre_resolution(&self) -> bool {
        !self.is_terminal() && !matches!(self, TicketStatus::Solved)
    }

    /// The next status along the fixed operational sequence, if any.
    pub fn operational_successor(&self) -> Option<TicketStatus> {
        match self {
            TicketStatus::Approved => Some(TicketStatus::Open),
            TicketStatus::Open => Some(TicketStatus::Pending),
            TicketStatus::Pending => Some(TicketStatus::Solved),
            TicketStatus::Solved => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Persisted string tag, e.g. `"pending_approval"` or `"level2_approved"`.
    pub fn as_tag(&self) -> String {
        match self {
            TicketStatus::New => "new".to_string(),
            TicketStatus::PendingApproval => "pending_approval".to_string(),
            TicketStatus::ChainApproved { level } => format!("level{}_approved", level),
            TicketStatus::Approved => "approved".to_string(),
            TicketStatus::Rejected => "rejected".to_string(),
            TicketStatus::Cancelled => "cancelled".to_string(),
            TicketStatus::Open => "open".to_string(),
            TicketStatus::Pending => "pending".to_string(),
            TicketStatus::Solved => "solved".to_string(),
            TicketStatus::Closed => "closed".to_string(),
        }
    }

    /// Parse a persisted status tag. Returns `None` for unknown tags.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag {
            "new" => Some(TicketStatus::New),
            "pending_approval" => Some(TicketStatus::PendingApproval),
            "approved" => Some(TicketStatus::Approved),
            "rejected" => Some(TicketStatus::Rejected),
            "cancelled" => Some(TicketStatus::Cancelled),
            "open" => Some(TicketStatus::Open),
            "pending" => Some(TicketStatus::Pending),
            "solved" => Some(TicketStatus::Solved),
            "closed" => Some(TicketStatus::Closed),
            other => {
                let re = regex_lite::Regex::new(r"^level([0-9]+)_approved$").ok()?;
                let caps = re.captures(other)?;
                let level: u32 = caps.get(1)?.as_str().parse().ok()?;
                Some(TicketStatus::ChainApproved { level })
            }
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// The persisted (status, approval level) pair.
///
/// This is the unit of contention: every state-changing write names the pair
/// it read, and the store only applies the write if the row still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowState {
    pub status: TicketStatus,
    pub approval_level: u32,
}

impl WorkflowState {
    pub fn new(status: TicketStatus, approval_level: u32) -> Self {
        Self {
            status,
            approval_level,
        }
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// A service request routed through the approval and resolution workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// Stable numeric identifier.
    pub id: i64,

    /// Human-facing identifier, `TKT-<year>-<4 digits>`, unique.
    pub number: TicketNumber,

    pub title: String,
    pub description: String,

    pub category_id: i64,
    /// Copied from the category at creation, immutable thereafter.
    pub department: String,
    pub priority: Priority,

    pub status: TicketStatus,

    /// Frozen at creation from the category's roster; later roster changes
    /// never move an existing ticket between branches.
    pub requires_approval: bool,

    /// Active approval level; meaningful only while `requires_approval` is
    /// true and the status is in the approval phase. Monotonically
    /// non-decreasing over the ticket's lifetime.
    pub current_approval_level: u32,

    pub created_by: i64,
    pub assigned_to: Option<i64>,
    /// The final approver, set once when the chain completes.
    pub approved_by: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub solved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Hours between creation and resolution, persisted at the moment of
    /// resolution. Retained as-is across a reopen until the next resolution
    /// overwrites it.
    pub sla_duration_hours: Option<f64>,
}

impl Ticket {
    /// The CAS expectation for this ticket's current persisted state.
    pub fn workflow_state(&self) -> WorkflowState {
        WorkflowState::new(self.status, self.current_approval_level)
    }
}
