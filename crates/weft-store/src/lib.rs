pub mod database;
pub mod error;
pub mod plans;
pub mod schema;
pub mod snapshots;

pub use database::Database;
pub use error::StoreError;
pub use plans::PlanRepo;
pub use snapshots::{MemorySnapshotSink, RunSnapshot, SnapshotLog, SnapshotSink};
