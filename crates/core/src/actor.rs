//! Actors and roles.
//!
//! Every engine operation takes an explicit [`Actor`] value; there is no
//! ambient session state. Authorization beyond role/roster eligibility
//! (session validity, credentials) is the caller's responsibility.

use serde::{Deserialize, Serialize};

/// Role of an actor invoking an engine operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May decide at any approval level, cancel, reopen and advance any ticket.
    Admin,
    /// Ordinary requester; may submit and cancel their own pending tickets.
    User,
    /// Decides approval levels they hold roster entries for.
    Approver,
    /// Works assigned tickets through the operational branch.
    Technician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Approver => "approver",
            Role::Technician => "technician",
        }
    }
}

/// An authenticated actor, passed into every engine call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A technician eligible for auto-assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Technician {
    pub user_id: i64,
    pub name: String,
}

/// Read-only port listing technicians that can receive direct-branch tickets.
///
/// User management is outside the engine; this is its entire surface.
pub trait TechnicianDirectory: Send + Sync {
    /// Active technicians, in no particular order.
    fn active_technicians(&self) -> Vec<Technician>;
}
