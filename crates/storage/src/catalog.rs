//! JSON-file catalog.
//!
//! The whole catalog lives in one JSON document next to a lock file.
//! Every mutating operation takes an exclusive `fs2` lock on the lock
//! file for the duration of its load-modify-persist cycle, which is what
//! serializes a scheduled cleanup against a concurrent backup run in
//! another process. Reads take a shared lock. Persistence is
//! write-temp-then-rename, so a crash never leaves a half-written
//! document behind.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dbkeep_core::{BackupRecord, BackupStatus, VerificationReport};

use crate::error::CatalogError;
use crate::traits::{Catalog, NewBackup, RecordFilter};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    backups: Vec<BackupRecord>,
    verifications: Vec<VerificationReport>,
}

/// File-backed catalog. Cheap to clone paths around; every operation
/// re-reads the document under lock, so instances in different processes
/// see each other's writes.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        JsonCatalog { path, lock_path }
    }

    fn lock_file(lock_path: &Path) -> io::Result<File> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
    }

    fn load(path: &Path) -> Result<CatalogDocument, CatalogError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CatalogDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(path: &Path, doc: &CatalogDocument) -> Result<(), CatalogError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Run `f` over the document under an exclusive lock, persisting the
    /// result. The lock spans load through rename: the critical section
    /// for all cross-process write serialization.
    async fn mutate<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&mut CatalogDocument) -> Result<T, CatalogError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        spawn_catalog_task(move || {
            let lock = Self::lock_file(&lock_path)?;
            lock.lock_exclusive()?;
            let mut doc = Self::load(&path)?;
            let out = f(&mut doc)?;
            Self::persist(&path, &doc)?;
            let _ = fs2::FileExt::unlock(&lock);
            Ok(out)
        })
        .await
    }

    /// Run `f` over a read-only view under a shared lock.
    async fn read<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&CatalogDocument) -> Result<T, CatalogError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        spawn_catalog_task(move || {
            let lock = Self::lock_file(&lock_path)?;
            lock.lock_shared()?;
            let doc = Self::load(&path)?;
            let out = f(&doc);
            let _ = fs2::FileExt::unlock(&lock);
            out
        })
        .await
    }
}

async fn spawn_catalog_task<T, F>(f: F) -> Result<T, CatalogError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CatalogError::Io(io::Error::other(e)))?
}

/// Newest first, ties broken by ascending id.
fn sort_newest_first(records: &mut [BackupRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn find_mut<'a>(
    doc: &'a mut CatalogDocument,
    id: &str,
) -> Result<&'a mut BackupRecord, CatalogError> {
    doc.backups
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })
}

fn require_pending(record: &BackupRecord) -> Result<(), CatalogError> {
    if record.status != BackupStatus::Pending {
        tracing::error!(
            id = %record.id,
            status = %record.status,
            "rejected status transition on non-pending record"
        );
        return Err(CatalogError::InvalidState {
            id: record.id.clone(),
            status: record.status,
        });
    }
    Ok(())
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn record(&self, new: NewBackup) -> Result<BackupRecord, CatalogError> {
        if new.database_name.trim().is_empty() {
            return Err(CatalogError::Validation("empty database name".into()));
        }
        if new.artifact_path.as_os_str().is_empty() {
            return Err(CatalogError::Validation("empty artifact path".into()));
        }
        let record = BackupRecord::new(
            new.database_kind,
            new.database_name,
            new.artifact_path,
            new.scope,
            OffsetDateTime::now_utc(),
        );
        let created = record.clone();
        self.mutate(move |doc| {
            doc.backups.push(record);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    async fn mark_completed(
        &self,
        id: &str,
        checksum: &str,
        size_bytes: u64,
    ) -> Result<BackupRecord, CatalogError> {
        if checksum.trim().is_empty() {
            return Err(CatalogError::Validation(
                "completed backup requires a checksum".into(),
            ));
        }
        if size_bytes == 0 {
            return Err(CatalogError::Validation(
                "completed backup requires a non-zero size".into(),
            ));
        }
        let id = id.to_string();
        let checksum = checksum.to_string();
        self.mutate(move |doc| {
            let record = find_mut(doc, &id)?;
            require_pending(record)?;
            record.status = BackupStatus::Completed;
            record.checksum = Some(checksum);
            record.size_bytes = size_bytes;
            Ok(record.clone())
        })
        .await
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<BackupRecord, CatalogError> {
        let id = id.to_string();
        let reason = reason.to_string();
        self.mutate(move |doc| {
            let record = find_mut(doc, &id)?;
            require_pending(record)?;
            record.status = BackupStatus::Failed;
            record.failure_reason = Some(reason);
            Ok(record.clone())
        })
        .await
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<BackupRecord>, CatalogError> {
        let filter = filter.clone();
        self.read(move |doc| {
            let mut records: Vec<BackupRecord> = doc
                .backups
                .iter()
                .filter(|r| {
                    filter
                        .database_name
                        .as_deref()
                        .map_or(true, |n| r.database_name == n)
                        && filter.database_kind.map_or(true, |k| r.database_kind == k)
                        && filter.since.map_or(true, |s| r.created_at >= s)
                })
                .cloned()
                .collect();
            sort_newest_first(&mut records);
            if let Some(limit) = filter.limit {
                records.truncate(limit);
            }
            Ok(records)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<BackupRecord, CatalogError> {
        let id = id.to_string();
        self.read(move |doc| {
            doc.backups
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(CatalogError::NotFound { id })
        })
        .await
    }

    async fn record_verification(&self, report: VerificationReport) -> Result<(), CatalogError> {
        self.mutate(move |doc| {
            doc.verifications.push(report);
            Ok(())
        })
        .await
    }

    async fn reports(
        &self,
        backup_id: Option<&str>,
    ) -> Result<Vec<VerificationReport>, CatalogError> {
        let backup_id = backup_id.map(str::to_string);
        self.read(move |doc| {
            let mut reports: Vec<VerificationReport> = doc
                .verifications
                .iter()
                .filter(|v| backup_id.as_deref().map_or(true, |id| v.backup_id == id))
                .cloned()
                .collect();
            reports.sort_by(|a, b| b.verified_at.cmp(&a.verified_at));
            Ok(reports)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let id = id.to_string();
        self.mutate(move |doc| {
            let before = doc.backups.len();
            doc.backups.retain(|r| r.id != id);
            if doc.backups.len() == before {
                return Err(CatalogError::NotFound { id });
            }
            // Cascade: a deleted backup takes its verification history with it.
            doc.verifications.retain(|v| v.backup_id != id);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbkeep_core::{BackupScope, CheckKind, CheckOutcome, DatabaseKind, VerifyOutcome};
    use std::path::PathBuf;

    fn catalog(dir: &tempfile::TempDir) -> JsonCatalog {
        JsonCatalog::new(dir.path().join("catalog.json"))
    }

    fn new_backup(name: &str) -> NewBackup {
        NewBackup {
            database_kind: DatabaseKind::Postgres,
            database_name: name.to_string(),
            artifact_path: PathBuf::from(format!("{name}.dump")),
            scope: BackupScope::Full,
        }
    }

    #[tokio::test]
    async fn record_starts_pending_and_completes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);

        let rec = cat.record(new_backup("orders")).await.unwrap();
        assert_eq!(rec.status, BackupStatus::Pending);
        assert!(rec.checksum.is_none());

        let done = cat
            .mark_completed(&rec.id, &"ab".repeat(32), 4096)
            .await
            .unwrap();
        assert_eq!(done.status, BackupStatus::Completed);
        assert_eq!(done.size_bytes, 4096);

        // Completed records never transition again.
        let err = cat.mark_failed(&rec.id, "boom").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidState { .. }));
        let err = cat
            .mark_completed(&rec.id, &"cd".repeat(32), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn completed_requires_checksum_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let rec = cat.record(new_backup("orders")).await.unwrap();

        assert!(matches!(
            cat.mark_completed(&rec.id, "", 4096).await,
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            cat.mark_completed(&rec.id, "abcd", 0).await,
            Err(CatalogError::Validation(_))
        ));
        // Still pending after the rejected transitions.
        assert_eq!(
            cat.get(&rec.id).await.unwrap().status,
            BackupStatus::Pending
        );
    }

    #[tokio::test]
    async fn rejects_empty_database_name() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let err = cat.record(new_backup("  ")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn query_orders_newest_first_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let a = cat.record(new_backup("orders")).await.unwrap();
        let b = cat.record(new_backup("orders")).await.unwrap();
        cat.record(new_backup("users")).await.unwrap();

        let all = cat.query(&RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        // created_at ties are possible at this resolution; ordering must
        // still be total and stable.
        let again = cat.query(&RecordFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| &r.id).collect();
        let ids_again: Vec<_> = again.iter().map(|r| &r.id).collect();
        assert_eq!(ids, ids_again);

        let orders = cat
            .query(&RecordFilter {
                database_name: Some("orders".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|r| r.database_name == "orders"));
        assert!(orders.iter().any(|r| r.id == a.id));
        assert!(orders.iter().any(|r| r.id == b.id));

        let limited = cat
            .query(&RecordFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let mongo = cat
            .query(&RecordFilter {
                database_kind: Some(DatabaseKind::Mongodb),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(mongo.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_reports() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let rec = cat.record(new_backup("orders")).await.unwrap();
        let report = VerificationReport::from_checks(
            rec.id.clone(),
            OffsetDateTime::now_utc(),
            vec![CheckOutcome::new(
                CheckKind::Presence,
                VerifyOutcome::Passed,
                "ok",
            )],
        );
        cat.record_verification(report).await.unwrap();
        assert_eq!(cat.reports(Some(&rec.id)).await.unwrap().len(), 1);

        cat.delete(&rec.id).await.unwrap();
        assert!(cat.reports(Some(&rec.id)).await.unwrap().is_empty());
        assert!(matches!(
            cat.get(&rec.id).await,
            Err(CatalogError::NotFound { .. })
        ));
        assert!(matches!(
            cat.delete(&rec.id).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let rec = {
            let cat = catalog(&dir);
            cat.record(new_backup("orders")).await.unwrap()
        };
        let cat = catalog(&dir);
        let got = cat.get(&rec.id).await.unwrap();
        assert_eq!(got.database_name, "orders");
        assert_eq!(got.status, BackupStatus::Pending);
    }
}
