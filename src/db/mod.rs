mod backup;
mod schema;
mod store;

pub use backup::spawn_outcome_logger;
pub use store::EntryStore;
