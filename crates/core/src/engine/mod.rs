mod error;
mod lifecycle;

pub use error::EngineError;
pub use lifecycle::{LifecycleEngine, TicketDraft};
