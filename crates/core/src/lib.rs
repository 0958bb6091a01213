pub mod actor;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod notify;
pub mod roster;
pub mod sla;
pub mod testing;
pub mod ticket;

pub use actor::{Actor, Role, Technician, TechnicianDirectory};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use engine::{EngineError, LifecycleEngine, TicketDraft};
pub use notify::{
    create_notifier, LifecycleEvent, NotificationRouter, NotificationSink, NotifierHandle,
};
pub use roster::{ApprovalRoster, RosterEntry, SqliteRoster};
pub use ticket::{
    DecisionOutcome, Priority, SqliteTicketStore, Ticket, TicketNumber, TicketStatus, TicketStore,
};
