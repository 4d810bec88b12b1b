use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

use dbkeep_core::{BackupRecord, BackupScope, DatabaseKind, VerificationReport};

use crate::error::{CatalogError, StoreError};

/// Metadata for a backup about to start. The catalog turns this into a
/// `Pending` record with a fresh id.
#[derive(Debug, Clone)]
pub struct NewBackup {
    pub database_kind: DatabaseKind,
    pub database_name: String,
    pub artifact_path: PathBuf,
    pub scope: BackupScope,
}

/// Filters for `Catalog::query`. All fields are conjunctive; `None`
/// means "any".
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub database_name: Option<String>,
    pub database_kind: Option<DatabaseKind>,
    /// Only records created at or after this instant.
    pub since: Option<OffsetDateTime>,
    pub limit: Option<usize>,
}

/// The authoritative, queryable store of backup records and verification
/// reports.
///
/// ## Write discipline
///
/// Implementations must serialize all mutating operations (`record`, the
/// status transitions, `record_verification`, `delete`) against concurrent
/// writers in other processes: a scheduled cleanup and an overlapping backup
/// run must never corrupt the catalog. Reads may proceed concurrently with
/// other reads.
///
/// ## Deletion ordering
///
/// `delete` removes the catalog entry and cascades to its reports. Callers
/// must remove the artifact from the backup store first and delete the
/// catalog entry second, so that a crash mid-cleanup leaves an orphaned
/// catalog entry (detectable on the next run) rather than an untracked
/// artifact.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    /// Create a `Pending` record. Rejects empty `database_name` with
    /// `CatalogError::Validation`.
    async fn record(&self, new: NewBackup) -> Result<BackupRecord, CatalogError>;

    /// One-shot transition `Pending -> Completed`, setting checksum and
    /// size. `CatalogError::InvalidState` if the record is not `Pending`;
    /// `Validation` on an empty checksum or zero size (a completed record
    /// always has both).
    async fn mark_completed(
        &self,
        id: &str,
        checksum: &str,
        size_bytes: u64,
    ) -> Result<BackupRecord, CatalogError>;

    /// One-shot transition `Pending -> Failed` with a reason.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<BackupRecord, CatalogError>;

    /// Filtered query, newest first, ties broken by ascending id.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<BackupRecord>, CatalogError>;

    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<BackupRecord, CatalogError>;

    /// Append a verification report. Reports are never overwritten.
    async fn record_verification(&self, report: VerificationReport) -> Result<(), CatalogError>;

    /// Verification history, newest first, optionally for one backup.
    async fn reports(
        &self,
        backup_id: Option<&str>,
    ) -> Result<Vec<VerificationReport>, CatalogError>;

    /// Remove a record and all its reports. `NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<(), CatalogError>;
}

/// Size and existence of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStat {
    pub size_bytes: u64,
}

/// Physical storage of artifact bytes, addressed by path.
#[async_trait]
pub trait BackupStore: Send + Sync + 'static {
    /// Size of the artifact, or `None` if it does not exist.
    async fn stat(&self, path: &Path) -> Result<Option<ArtifactStat>, StoreError>;

    /// Open the artifact for streamed reading. Callers consume it in
    /// fixed-size chunks; implementations must not buffer the whole file.
    async fn open(&self, path: &Path)
        -> Result<Pin<Box<dyn AsyncRead + Send>>, StoreError>;

    /// Remove the artifact. `StoreError::NotFound` if it is already gone.
    async fn delete(&self, path: &Path) -> Result<(), StoreError>;
}
