//! SQLite-backed approval roster.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{ApprovalRoster, RosterEntry, RosterError};

/// SQLite-backed roster store.
///
/// Lives in the same database file as the ticket store but only touches its
/// own table.
pub struct SqliteRoster {
    conn: Mutex<Connection>,
}

impl SqliteRoster {
    pub fn new(path: &Path) -> Result<Self, RosterError> {
        let conn = Connection::open(path).map_err(|e| RosterError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, RosterError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RosterError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RosterError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS category_approvers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                approval_level INTEGER NOT NULL DEFAULT 1,
                UNIQUE(category_id, user_id, approval_level)
            );

            CREATE INDEX IF NOT EXISTS idx_category_approvers_category
                ON category_approvers(category_id);
            "#,
        )
        .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(())
    }

    /// Grant a user approval rights at a level of a category. Idempotent.
    pub fn add_entry(&self, entry: &RosterEntry) -> Result<(), RosterError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO category_approvers (category_id, user_id, approval_level) \
             VALUES (?, ?, ?)",
            params![entry.category_id, entry.user_id, entry.approval_level],
        )
        .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(())
    }

    /// Revoke a grant. Removing the last entry of a category flips future
    /// submissions to the direct branch; existing tickets are unaffected.
    pub fn remove_entry(&self, entry: &RosterEntry) -> Result<(), RosterError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM category_approvers \
             WHERE category_id = ? AND user_id = ? AND approval_level = ?",
            params![entry.category_id, entry.user_id, entry.approval_level],
        )
        .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(())
    }

    /// All grants for a category, lowest level first.
    pub fn entries_for_category(&self, category_id: i64) -> Result<Vec<RosterEntry>, RosterError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT category_id, user_id, approval_level FROM category_approvers \
                 WHERE category_id = ? ORDER BY approval_level ASC, user_id ASC",
            )
            .map_err(|e| RosterError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![category_id], |row| {
                Ok(RosterEntry {
                    category_id: row.get(0)?,
                    user_id: row.get(1)?,
                    approval_level: row.get(2)?,
                })
            })
            .map_err(|e| RosterError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row_result in rows {
            entries.push(row_result.map_err(|e| RosterError::Database(e.to_string()))?);
        }
        Ok(entries)
    }
}

impl ApprovalRoster for SqliteRoster {
    fn requires_approval(&self, category_id: i64) -> Result<bool, RosterError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM category_approvers WHERE category_id = ?",
                params![category_id],
                |row| row.get(0),
            )
            .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    fn max_level(&self, category_id: i64) -> Result<u32, RosterError> {
        let conn = self.conn.lock().unwrap();
        let max: Option<u32> = conn
            .query_row(
                "SELECT MAX(approval_level) FROM category_approvers WHERE category_id = ?",
                params![category_id],
                |row| row.get(0),
            )
            .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(max.unwrap_or(1))
    }

    fn is_eligible_decider(
        &self,
        category_id: i64,
        user_id: i64,
        level: u32,
    ) -> Result<bool, RosterError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM category_approvers \
                 WHERE category_id = ? AND user_id = ? AND approval_level = ?",
                params![category_id, user_id, level],
                |row| row.get(0),
            )
            .map_err(|e| RosterError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    fn next_level_with_approvers(
        &self,
        category_id: i64,
        level: u32,
    ) -> Result<Option<u32>, RosterError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT MIN(approval_level) FROM category_approvers \
             WHERE category_id = ? AND approval_level > ?",
            params![category_id, level],
            |row| row.get(0),
        )
        .optional()
        .map(|v| v.flatten())
        .map_err(|e| RosterError::Database(e.to_string()))
    }
}
