pub mod accounts;
pub mod sync;

pub use accounts::{AccountService, DriveStatus, LinkOutcome};
pub use sync::{FileOutcome, SyncCounts, SyncEngine, SyncReport};
