use uuid::Uuid;

pub mod listing;
pub mod search_query;
pub mod session;

// Re-exports for convenience
pub use listing::*;
pub use search_query::*;
pub use session::*;

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
