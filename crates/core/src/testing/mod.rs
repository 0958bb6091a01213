//! Test doubles and fixtures shared by unit and integration tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::actor::{Actor, Role, Technician, TechnicianDirectory};
use crate::engine::TicketDraft;
use crate::notify::{EventEnvelope, LifecycleEvent, NotificationSink, NotifyError};
use crate::roster::{ApprovalRoster, RosterEntry, RosterError};
use crate::ticket::{Category, Priority};

/// In-memory roster built from a fixed entry list.
#[derive(Default)]
pub struct FixedRoster {
    entries: Vec<RosterEntry>,
}

impl FixedRoster {
    /// Roster with no entries; every category takes the direct branch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, category_id: i64, user_id: i64, approval_level: u32) -> Self {
        self.entries.push(RosterEntry {
            category_id,
            user_id,
            approval_level,
        });
        self
    }
}

impl ApprovalRoster for FixedRoster {
    fn requires_approval(&self, category_id: i64) -> Result<bool, RosterError> {
        Ok(self.entries.iter().any(|e| e.category_id == category_id))
    }

    fn max_level(&self, category_id: i64) -> Result<u32, RosterError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.category_id == category_id)
            .map(|e| e.approval_level)
            .max()
            .unwrap_or(1))
    }

    fn is_eligible_decider(
        &self,
        category_id: i64,
        user_id: i64,
        level: u32,
    ) -> Result<bool, RosterError> {
        Ok(self.entries.iter().any(|e| {
            e.category_id == category_id && e.user_id == user_id && e.approval_level == level
        }))
    }

    fn next_level_with_approvers(
        &self,
        category_id: i64,
        level: u32,
    ) -> Result<Option<u32>, RosterError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.category_id == category_id && e.approval_level > level)
            .map(|e| e.approval_level)
            .min())
    }
}

/// Directory with a fixed technician list.
#[derive(Default)]
pub struct StaticDirectory {
    technicians: Vec<Technician>,
}

impl StaticDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_technician(mut self, user_id: i64, name: impl Into<String>) -> Self {
        self.technicians.push(Technician {
            user_id,
            name: name.into(),
        });
        self
    }
}

impl TechnicianDirectory for StaticDirectory {
    fn active_technicians(&self) -> Vec<Technician> {
        self.technicians.clone()
    }
}

/// Sink that records every delivered envelope.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.event_type())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Common fixture values for tests.
pub mod fixtures {
    use super::*;

    pub fn admin() -> Actor {
        Actor::new(1, "admin", Role::Admin)
    }

    pub fn requester(id: i64) -> Actor {
        Actor::new(id, format!("user-{}", id), Role::User)
    }

    pub fn approver(id: i64) -> Actor {
        Actor::new(id, format!("approver-{}", id), Role::Approver)
    }

    pub fn technician(id: i64) -> Actor {
        Actor::new(id, format!("tech-{}", id), Role::Technician)
    }

    pub fn hardware_category() -> Category {
        Category::new(1, "Hardware", "IT")
    }

    pub fn facilities_category() -> Category {
        Category::new(2, "Facilities", "Operations")
    }

    pub fn draft(category: Category) -> TicketDraft {
        TicketDraft {
            title: "Laptop battery swelling".to_string(),
            description: "The battery bulges and the case no longer closes.".to_string(),
            category,
            priority: Priority::High,
        }
    }
}
