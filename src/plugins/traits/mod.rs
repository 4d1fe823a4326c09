pub mod notifier;
pub mod updates;

pub use notifier::{Notifier, SyncSummary};
pub use updates::{ChatUpdate, IncomingMessage, UpdateSource};
