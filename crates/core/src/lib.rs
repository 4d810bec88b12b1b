//! dbkeep core -- backup catalog records, the retention policy engine,
//! and read-only history/stats projections.
//!
//! Everything in this crate is pure: records come in as values, plans and
//! projections come out as values. Catalog persistence, artifact I/O, and
//! the dump binaries live in the sibling crates.

pub mod event;
pub mod record;
pub mod retention;
pub mod stats;

pub use event::{EventKind, NotificationEvent};
pub use record::{
    BackupRecord, BackupScope, BackupStatus, CheckKind, CheckOutcome, DatabaseKind,
    VerificationReport, VerifyOutcome,
};
pub use retention::{DeleteCandidate, DeleteReason, RetentionPlan, RetentionPolicy};
pub use stats::{
    backup_stats, retention_stats, verification_stats, AgeBuckets, BackupStats,
    DatabaseRetention, RetentionStats, VerificationStats,
};
