pub mod traits;
pub mod notifiers;

pub use traits::{ChatUpdate, IncomingMessage, Notifier, SyncSummary, UpdateSource};
