pub mod bot;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod database;
pub mod extractor;
pub mod logging;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use commands::{Command, CommandHandler, Reply};
pub use config::AppConfig;
pub use database::Database;
pub use scheduler::{SessionScheduler, SyncWorker};
pub use sync::SyncEngine;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
