mod dispatcher;
mod events;
mod handle;

pub use dispatcher::*;
pub use events::*;
pub use handle::*;
