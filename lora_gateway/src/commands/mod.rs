// commands/mod.rs: operator commands: validation, retry queue, console intake
pub mod console;
pub mod handler;
pub mod queue;

pub use handler::{CommandRequest, ValidCommand};
pub use queue::{ActivityReport, CommandRetryQueue, Enqueued, QueuePolicy, QueuedCommand};
