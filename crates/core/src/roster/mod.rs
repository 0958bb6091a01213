//! Approval roster: which users may decide at which level of which category.
//!
//! The roster is the single source of the branch decision at submission. A
//! category with at least one entry routes new tickets through the approval
//! chain; a category with none goes straight to assignment. Levels need not
//! be contiguous, the chain simply skips to the next level that has
//! approvers.

mod sqlite;

pub use sqlite::SqliteRoster;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Database error: {0}")]
    Database(String),
}

/// One (category, user, level) grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub category_id: i64,
    pub user_id: i64,
    pub approval_level: u32,
}

/// Read interface the lifecycle engine consults for approval routing.
pub trait ApprovalRoster: Send + Sync {
    /// True if the category has any roster entry at all.
    fn requires_approval(&self, category_id: i64) -> Result<bool, RosterError>;

    /// Highest level with an approver, or 1 for an empty roster.
    fn max_level(&self, category_id: i64) -> Result<u32, RosterError>;

    /// True if the user holds a grant at exactly this level of the category.
    fn is_eligible_decider(
        &self,
        category_id: i64,
        user_id: i64,
        level: u32,
    ) -> Result<bool, RosterError>;

    /// Lowest level strictly above `level` that has at least one approver.
    fn next_level_with_approvers(
        &self,
        category_id: i64,
        level: u32,
    ) -> Result<Option<u32>, RosterError>;
}
