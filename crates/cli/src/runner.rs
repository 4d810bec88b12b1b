//! Shared machinery behind the backup and cleanup commands: the single
//! dump lifecycle (record, dump, transition, notify) and the bounded
//! retry around artifact deletion.

use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use dbkeep_adapters::{adapter_for, DumpRequest};
use dbkeep_core::{BackupRecord, BackupScope, DatabaseKind, EventKind, NotificationEvent};
use dbkeep_storage::{BackupStore, Catalog, JsonCatalog, LocalStore, NewBackup, StoreError};

use crate::config::{Config, DatabaseTarget};
use crate::notify::SlackNotifier;

const FILENAME_TS: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Artifact filename for a new dump, matching the engine's natural
/// extension: `orders_postgres_backup_20260110_030000.dump`.
pub(crate) fn artifact_filename(
    database: &str,
    kind: DatabaseKind,
    created_at: OffsetDateTime,
) -> PathBuf {
    let ext = match kind {
        DatabaseKind::Postgres => "dump",
        DatabaseKind::Mysql => "sql",
        DatabaseKind::Mongodb => "archive",
    };
    let ts = created_at
        .format(FILENAME_TS)
        .unwrap_or_else(|_| "00000000_000000".to_string());
    PathBuf::from(format!("{database}_{kind}_backup_{ts}.{ext}"))
}

/// Run one dump end to end: create the `Pending` record, invoke the
/// adapter under its timeout, transition the record, and emit the
/// notification event. Any interruption (timeout, tool failure, kill)
/// leaves the record `Failed`, never `Completed` with a partial artifact.
pub(crate) async fn run_backup(
    cfg: &Config,
    target: &DatabaseTarget,
    tables: &[String],
    catalog: &JsonCatalog,
    notifier: &SlackNotifier,
) -> Result<BackupRecord, String> {
    let now = OffsetDateTime::now_utc();
    let filename = artifact_filename(&target.name, target.kind, now);
    let scope = if tables.is_empty() {
        BackupScope::Full
    } else {
        BackupScope::Partial(tables.to_vec())
    };

    std::fs::create_dir_all(&cfg.backup_dir)
        .map_err(|e| format!("cannot create backup dir: {e}"))?;

    let record = catalog
        .record(NewBackup {
            database_kind: target.kind,
            database_name: target.name.clone(),
            artifact_path: filename.clone(),
            scope: scope.clone(),
        })
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(
        database = %target.name,
        kind = %target.kind,
        artifact = %filename.display(),
        "backup started"
    );

    let adapter = adapter_for(target.kind, target.profile());
    let outcome = adapter
        .dump(&DumpRequest {
            output_path: cfg.backup_dir.join(&filename),
            scope,
            timeout: cfg.dump_timeout(),
        })
        .await;

    match outcome {
        Ok(artifact) => {
            let record = catalog
                .mark_completed(&record.id, &artifact.checksum, artifact.size_bytes)
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!(
                database = %target.name,
                size_bytes = artifact.size_bytes,
                "backup completed"
            );
            notifier.send(&NotificationEvent::new(
                EventKind::BackupSucceeded,
                &target.name,
                OffsetDateTime::now_utc(),
                format!(
                    "{} ({} bytes)",
                    record.artifact_path.display(),
                    artifact.size_bytes
                ),
            ));
            Ok(record)
        }
        Err(e) => {
            let reason = e.to_string();
            tracing::error!(database = %target.name, "backup failed: {reason}");
            if let Err(mark_err) = catalog.mark_failed(&record.id, &reason).await {
                tracing::error!(
                    id = %record.id,
                    "could not mark backup failed: {mark_err}"
                );
            }
            notifier.send(&NotificationEvent::new(
                EventKind::BackupFailed,
                &target.name,
                OffsetDateTime::now_utc(),
                reason.clone(),
            ));
            Err(reason)
        }
    }
}

/// Delete an artifact with bounded retry for transient store errors.
///
/// Returns `Ok(true)` when a file was removed, `Ok(false)` when it was
/// already gone (an orphaned catalog entry from an interrupted cleanup;
/// removing the entry completes the earlier run).
pub(crate) async fn delete_with_retry(
    store: &LocalStore,
    path: &Path,
) -> Result<bool, StoreError> {
    const ATTEMPTS: u32 = 3;
    let mut delay = std::time::Duration::from_millis(100);
    for attempt in 1..=ATTEMPTS {
        match store.delete(path).await {
            Ok(()) => return Ok(true),
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(
                    artifact = %path.display(),
                    "artifact already gone; removing orphaned catalog entry"
                );
                return Ok(false);
            }
            Err(e) if attempt < ATTEMPTS => {
                tracing::warn!(
                    artifact = %path.display(),
                    attempt,
                    "delete failed, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop returns on final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn filenames_embed_database_kind_and_timestamp() {
        let name = artifact_filename(
            "orders",
            DatabaseKind::Postgres,
            datetime!(2026-01-10 03:04:05 UTC),
        );
        assert_eq!(
            name,
            PathBuf::from("orders_postgres_backup_20260110_030405.dump")
        );
        let name = artifact_filename(
            "events",
            DatabaseKind::Mongodb,
            datetime!(2026-01-10 03:04:05 UTC),
        );
        assert_eq!(
            name,
            PathBuf::from("events_mongodb_backup_20260110_030405.archive")
        );
    }
}
