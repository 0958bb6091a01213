//! SQLite-backed ticket store implementation.
//!
//! The workflow-critical piece is [`SqliteTicketStore::apply_transition`]:
//! a conditional UPDATE guarded by the (status, current_approval_level) pair
//! the caller read, with the decision record and history entry inserted in
//! the same transaction. Zero affected rows means another transition won the
//! race and nothing at all is written.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, Connection, Transaction};

use super::{
    ApprovalDecision, CreateTicketRequest, DecisionOutcome, HistoryEntry, NewHistoryEntry,
    StoreError, Ticket, TicketFilter, TicketNumber, TicketStatus, TicketStore, TransitionUpdate,
    WorkflowState,
};

/// How many fresh ticket numbers to try before giving up on creation.
const NUMBER_GENERATION_ATTEMPTS: u32 = 100;

const TICKET_COLUMNS: &str = "id, number, title, description, category_id, department, priority, \
     status, requires_approval, current_approval_level, created_by, assigned_to, approved_by, \
     created_at, solved_at, closed_at, updated_at, sla_duration_hours";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a store backed by a database file, creating tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category_id INTEGER NOT NULL,
                department TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                requires_approval INTEGER NOT NULL,
                current_approval_level INTEGER NOT NULL DEFAULT 1,
                created_by INTEGER NOT NULL,
                assigned_to INTEGER,
                approved_by INTEGER,
                created_at TEXT NOT NULL,
                solved_at TEXT,
                closed_at TEXT,
                updated_at TEXT NOT NULL,
                sla_duration_hours REAL
            );

            CREATE TABLE IF NOT EXISTS ticket_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id),
                approval_level INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                decided_by INTEGER NOT NULL,
                comment TEXT,
                decided_at TEXT NOT NULL,
                UNIQUE(ticket_id, approval_level)
            );

            CREATE TABLE IF NOT EXISTS ticket_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id),
                actor_id INTEGER NOT NULL,
                note TEXT NOT NULL,
                old_status TEXT,
                new_status TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_by ON tickets(created_by);
            CREATE INDEX IF NOT EXISTS idx_tickets_assigned_to ON tickets(assigned_to);
            CREATE INDEX IF NOT EXISTS idx_ticket_history_ticket ON ticket_history(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_ticket_decisions_ticket ON ticket_decisions(ticket_id);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.clone()));
        }

        if let Some(created_by) = filter.created_by {
            conditions.push("created_by = ?");
            params.push(Box::new(created_by));
        }

        if let Some(assigned_to) = filter.assigned_to {
            conditions.push("assigned_to = ?");
            params.push(Box::new(assigned_to));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: i64 = row.get(0)?;
        let number_str: String = row.get(1)?;
        let title: String = row.get(2)?;
        let description: String = row.get(3)?;
        let category_id: i64 = row.get(4)?;
        let department: String = row.get(5)?;
        let priority_str: String = row.get(6)?;
        let status_str: String = row.get(7)?;
        let requires_approval: bool = row.get(8)?;
        let current_approval_level: u32 = row.get(9)?;
        let created_by: i64 = row.get(10)?;
        let assigned_to: Option<i64> = row.get(11)?;
        let approved_by: Option<i64> = row.get(12)?;
        let created_at_str: String = row.get(13)?;
        let solved_at_str: Option<String> = row.get(14)?;
        let closed_at_str: Option<String> = row.get(15)?;
        let updated_at_str: String = row.get(16)?;
        let sla_duration_hours: Option<f64> = row.get(17)?;

        let number = TicketNumber::parse(&number_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("invalid ticket number: {}", number_str).into(),
            )
        })?;

        let priority = super::Priority::parse(&priority_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown priority: {}", priority_str).into(),
            )
        })?;

        let status = TicketStatus::parse_tag(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("unknown status tag: {}", status_str).into(),
            )
        })?;

        Ok(Ticket {
            id,
            number,
            title,
            description,
            category_id,
            department,
            priority,
            status,
            requires_approval,
            current_approval_level,
            created_by,
            assigned_to,
            approved_by,
            created_at: parse_timestamp(&created_at_str, 13)?,
            solved_at: solved_at_str
                .as_deref()
                .map(|s| parse_timestamp(s, 14))
                .transpose()?,
            closed_at: closed_at_str
                .as_deref()
                .map(|s| parse_timestamp(s, 15))
                .transpose()?,
            updated_at: parse_timestamp(&updated_at_str, 16)?,
            sla_duration_hours,
        })
    }

    fn get_with_conn(conn: &Connection, id: i64) -> Result<Option<Ticket>, StoreError> {
        let sql = format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS);
        let result = conn.query_row(&sql, params![id], Self::row_to_ticket);
        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn insert_history(
        tx: &Transaction,
        ticket_id: i64,
        entry: &NewHistoryEntry,
        now: &DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO ticket_history (ticket_id, actor_id, note, old_status, new_status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                ticket_id,
                entry.actor_id,
                entry.note,
                entry.old_status.map(|s| s.as_tag()),
                entry.new_status.map(|s| s.as_tag()),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

fn parse_timestamp(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("invalid timestamp '{}': {}", s, e).into(),
            )
        })
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let now = Utc::now();
        let year = now.year();

        // Random numbers collide eventually; regenerate until the unique
        // index accepts one.
        let mut ticket_id = None;
        let mut number = TicketNumber::generate(year);
        for _ in 0..NUMBER_GENERATION_ATTEMPTS {
            let result = tx.execute(
                "INSERT INTO tickets (number, title, description, category_id, department, \
                 priority, status, requires_approval, current_approval_level, created_by, \
                 created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
                params![
                    number.as_str(),
                    request.title,
                    request.description,
                    request.category_id,
                    request.department,
                    request.priority.as_str(),
                    TicketStatus::New.as_tag(),
                    request.requires_approval,
                    request.created_by,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            );
            match result {
                Ok(_) => {
                    ticket_id = Some(tx.last_insert_rowid());
                    break;
                }
                Err(ref e) if Self::is_unique_violation(e) => {
                    number = TicketNumber::generate(year);
                }
                Err(e) => return Err(StoreError::Database(e.to_string())),
            }
        }

        let ticket_id = ticket_id.ok_or_else(|| {
            StoreError::Database("exhausted ticket number generation attempts".to_string())
        })?;

        Self::insert_history(
            &tx,
            ticket_id,
            &NewHistoryEntry::note(request.created_by, "Ticket created"),
            &now,
        )?;

        let ticket = Self::get_with_conn(&tx, ticket_id)?
            .ok_or(StoreError::NotFound(ticket_id))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ticket)
    }

    fn get(&self, id: i64) -> Result<Option<Ticket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::get_with_conn(&conn, id)
    }

    fn get_by_number(&self, number: &TicketNumber) -> Result<Option<Ticket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM tickets WHERE number = ?", TICKET_COLUMNS);
        let result = conn.query_row(&sql, params![number.as_str()], Self::row_to_ticket);
        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY \
             CASE priority WHEN 'urgent' THEN 1 WHEN 'high' THEN 2 WHEN 'medium' THEN 3 ELSE 4 END, \
             created_at ASC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            tickets.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn count_open_assigned(&self, user_id: i64) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE assigned_to = ? \
             AND status NOT IN ('solved', 'closed', 'cancelled', 'rejected')",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn apply_transition(
        &self,
        id: i64,
        expected: WorkflowState,
        update: TransitionUpdate,
    ) -> Result<Ticket, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let now = Utc::now();

        let mut sets: Vec<&str> = vec!["status = ?", "updated_at = ?"];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(update.new_status.as_tag()),
            Box::new(now.to_rfc3339()),
        ];

        if let Some(level) = update.approval_level {
            sets.push("current_approval_level = ?");
            values.push(Box::new(level));
        }
        if let Some(assignee) = update.assigned_to {
            sets.push("assigned_to = ?");
            values.push(Box::new(assignee));
        }
        if let Some(approver) = update.approved_by {
            sets.push("approved_by = ?");
            values.push(Box::new(approver));
        }
        if let Some(solved_at) = update.solved_at {
            sets.push("solved_at = ?");
            values.push(Box::new(solved_at.to_rfc3339()));
        }
        if let Some(closed_at) = update.closed_at {
            sets.push("closed_at = ?");
            values.push(Box::new(closed_at.map(|t| t.to_rfc3339())));
        }
        if let Some(sla) = update.sla_duration_hours {
            sets.push("sla_duration_hours = ?");
            values.push(Box::new(sla));
        }

        values.push(Box::new(id));
        values.push(Box::new(expected.status.as_tag()));
        values.push(Box::new(expected.approval_level));

        let sql = format!(
            "UPDATE tickets SET {} WHERE id = ? AND status = ? AND current_approval_level = ?",
            sets.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let affected = tx
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            // Either the ticket is gone or another transition was applied
            // first. Distinguish so callers can report the right error.
            let exists = Self::get_with_conn(&tx, id)?.is_some();
            return if exists {
                Err(StoreError::Conflict {
                    ticket_id: id,
                    expected: format!(
                        "{}/level {}",
                        expected.status.as_tag(),
                        expected.approval_level
                    ),
                })
            } else {
                Err(StoreError::NotFound(id))
            };
        }

        if let Some(ref decision) = update.decision {
            let result = tx.execute(
                "INSERT INTO ticket_decisions (ticket_id, approval_level, outcome, decided_by, \
                 comment, decided_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    decision.approval_level,
                    decision.outcome.as_str(),
                    decision.decided_by,
                    decision.comment,
                    now.to_rfc3339(),
                ],
            );
            if let Err(e) = result {
                return if Self::is_unique_violation(&e) {
                    Err(StoreError::DuplicateDecision {
                        ticket_id: id,
                        level: decision.approval_level,
                    })
                } else {
                    Err(StoreError::Database(e.to_string()))
                };
            }
        }

        Self::insert_history(&tx, id, &update.history, &now)?;

        let ticket = Self::get_with_conn(&tx, id)?.ok_or(StoreError::NotFound(id))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ticket)
    }

    fn assign(
        &self,
        id: i64,
        assigned_to: Option<i64>,
        history: NewHistoryEntry,
    ) -> Result<Ticket, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let now = Utc::now();
        let affected = tx
            .execute(
                "UPDATE tickets SET assigned_to = ?, updated_at = ? WHERE id = ?",
                params![assigned_to, now.to_rfc3339(), id],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        Self::insert_history(&tx, id, &history, &now)?;

        let ticket = Self::get_with_conn(&tx, id)?.ok_or(StoreError::NotFound(id))?;
        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ticket)
    }

    fn append_history(&self, id: i64, entry: NewHistoryEntry) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if Self::get_with_conn(&tx, id)?.is_none() {
            return Err(StoreError::NotFound(id));
        }

        let now = Utc::now();
        Self::insert_history(&tx, id, &entry, &now)?;
        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn history(&self, id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, ticket_id, actor_id, note, old_status, new_status, created_at \
                 FROM ticket_history WHERE ticket_id = ? ORDER BY id ASC",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![id], |row| {
                let old_status: Option<String> = row.get(4)?;
                let new_status: Option<String> = row.get(5)?;
                let created_at: String = row.get(6)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    actor_id: row.get(2)?,
                    note: row.get(3)?,
                    old_status: old_status.as_deref().and_then(TicketStatus::parse_tag),
                    new_status: new_status.as_deref().and_then(TicketStatus::parse_tag),
                    created_at: parse_timestamp(&created_at, 6)?,
                })
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row_result in rows {
            entries.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(entries)
    }

    fn decisions(&self, id: i64) -> Result<Vec<ApprovalDecision>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, ticket_id, approval_level, outcome, decided_by, comment, decided_at \
                 FROM ticket_decisions WHERE ticket_id = ? ORDER BY approval_level ASC",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![id], |row| {
                let outcome_str: String = row.get(3)?;
                let outcome = DecisionOutcome::parse(&outcome_str).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        format!("unknown decision outcome: {}", outcome_str).into(),
                    )
                })?;
                let decided_at: String = row.get(6)?;
                Ok(ApprovalDecision {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    approval_level: row.get(2)?,
                    outcome,
                    decided_by: row.get(4)?,
                    comment: row.get(5)?,
                    decided_at: parse_timestamp(&decided_at, 6)?,
                })
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut decisions = Vec::new();
        for row_result in rows {
            decisions.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(decisions)
    }
}
