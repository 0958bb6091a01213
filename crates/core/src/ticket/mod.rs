mod number;
mod sqlite_store;
mod store;
mod types;

pub use number::{TicketNumber, TICKET_NUMBER_PREFIX};
pub use sqlite_store::SqliteTicketStore;
pub use store::{
    ApprovalDecision, CreateTicketRequest, DecisionOutcome, HistoryEntry, NewDecision,
    NewHistoryEntry, StoreError, TicketFilter, TicketStore, TransitionUpdate,
};
pub use types::{Category, Priority, Ticket, TicketStatus, WorkflowState};
