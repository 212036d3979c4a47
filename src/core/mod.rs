mod outcome;
mod record;
mod snapshot;

pub use outcome::{CleanupOutcome, ProvisionOutcome};
pub use record::UserRecord;
pub use snapshot::{DiskUsage, HealthSnapshot, MemoryUsage};
