//! Verification engine.
//!
//! Inspects one backup artifact for integrity without performing a
//! restore: existence and size, format header bytes, a streamed checksum
//! recomputation, and a lightweight structural scan where the format
//! supports one. Each run appends a `VerificationReport`; nothing about
//! the artifact or its record is ever mutated, so verifying an unchanged
//! artifact twice yields the same result.

use std::path::Path;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;

use dbkeep_adapters::{AdapterError, DatabaseAdapter, ObjectListing};
use dbkeep_core::{BackupRecord, CheckKind, CheckOutcome, VerificationReport, VerifyOutcome};
use dbkeep_storage::{BackupStore, StoreError};

/// Chunk size for streamed hashing; peak memory stays fixed regardless of
/// artifact size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors that prevent verification from producing a report at all.
/// A corrupt artifact is not an error: it yields a report with
/// `result = Corrupted`.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("backup store error during verification: {0}")]
    Store(#[from] StoreError),
}

/// Run all checks against one record's artifact.
///
/// Checks short-circuit on the first hard failure; the report's result is
/// the worst outcome across the checks performed.
pub async fn verify(
    record: &BackupRecord,
    store: &dyn BackupStore,
    adapter: &dyn DatabaseAdapter,
) -> Result<VerificationReport, VerifyError> {
    let mut detail: Vec<CheckOutcome> = Vec::new();
    let path = record.artifact_path.as_path();

    // Presence and size.
    let size = match store.stat(path).await? {
        Some(stat) if stat.size_bytes > 0 => stat.size_bytes,
        _ => {
            detail.push(CheckOutcome::new(
                CheckKind::Presence,
                VerifyOutcome::Corrupted,
                "missing or empty",
            ));
            return Ok(finish(record, detail));
        }
    };
    detail.push(CheckOutcome::new(
        CheckKind::Presence,
        VerifyOutcome::Passed,
        format!("{size} bytes"),
    ));

    // Header and checksum share a single pass over the artifact: the
    // leading bytes are checked against the format signature, then fed
    // into the hasher along with the rest of the stream.
    let signature = adapter.header_signature();
    let mut reader = store.open(path).await?;
    let mut leading = vec![0u8; signature.max_len().min(size as usize)];
    if let Err(e) = reader.read_exact(&mut leading).await {
        detail.push(CheckOutcome::new(
            CheckKind::Header,
            VerifyOutcome::Corrupted,
            format!("could not read format header: {e}"),
        ));
        return Ok(finish(record, detail));
    }
    if !signature.matches(&leading) {
        detail.push(CheckOutcome::new(
            CheckKind::Header,
            VerifyOutcome::Corrupted,
            format!("leading bytes do not match {}", signature.description),
        ));
        return Ok(finish(record, detail));
    }
    detail.push(CheckOutcome::new(
        CheckKind::Header,
        VerifyOutcome::Passed,
        signature.description,
    ));

    match &record.checksum {
        Some(expected) => {
            let mut hasher = Sha256::new();
            hasher.update(&leading);
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = reader
                    .read(&mut buf)
                    .await
                    .map_err(|e| VerifyError::Store(StoreError::Io(e)))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let actual = format!("{:x}", hasher.finalize());
            if &actual != expected {
                detail.push(CheckOutcome::new(
                    CheckKind::Checksum,
                    VerifyOutcome::Corrupted,
                    format!("recorded {expected}, recomputed {actual}"),
                ));
                return Ok(finish(record, detail));
            }
            detail.push(CheckOutcome::new(
                CheckKind::Checksum,
                VerifyOutcome::Passed,
                "matches recorded checksum",
            ));
        }
        None => {
            // Nothing to compare against: not a failure.
            detail.push(CheckOutcome::new(
                CheckKind::Checksum,
                VerifyOutcome::Indeterminate,
                "no recorded checksum",
            ));
        }
    }

    detail.push(structural_scan(adapter, path).await);
    Ok(finish(record, detail))
}

async fn structural_scan(adapter: &dyn DatabaseAdapter, path: &Path) -> CheckOutcome {
    match adapter.list_objects(path).await {
        Ok(ObjectListing::Objects(objects)) if objects.is_empty() => CheckOutcome::new(
            CheckKind::Structure,
            VerifyOutcome::Corrupted,
            "no objects found in artifact",
        ),
        Ok(ObjectListing::Objects(objects)) => CheckOutcome::new(
            CheckKind::Structure,
            VerifyOutcome::Passed,
            format!("{} objects", objects.len()),
        ),
        Ok(ObjectListing::Unsupported) => CheckOutcome::new(
            CheckKind::Structure,
            VerifyOutcome::Indeterminate,
            "format does not support listing",
        ),
        // The listing tool rejecting the artifact is evidence of
        // corruption; the tool being absent is not.
        Err(AdapterError::ToolFailed { tool, stderr }) => CheckOutcome::new(
            CheckKind::Structure,
            VerifyOutcome::Corrupted,
            format!("{tool} rejected artifact: {stderr}"),
        ),
        Err(e) => CheckOutcome::new(
            CheckKind::Structure,
            VerifyOutcome::Indeterminate,
            format!("structural scan unavailable: {e}"),
        ),
    }
}

fn finish(record: &BackupRecord, detail: Vec<CheckOutcome>) -> VerificationReport {
    let report =
        VerificationReport::from_checks(record.id.clone(), OffsetDateTime::now_utc(), detail);
    tracing::info!(
        backup_id = %report.backup_id,
        result = %report.result,
        checks = report.detail.len(),
        "verification finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbkeep_adapters::HeaderSignature;
    use dbkeep_core::{BackupScope, BackupStatus, DatabaseKind};
    use dbkeep_storage::ArtifactStat;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::pin::Pin;
    use time::macros::datetime;
    use tokio::io::AsyncRead;

    struct MemStore {
        files: HashMap<PathBuf, Vec<u8>>,
    }

    impl MemStore {
        fn with(path: &str, bytes: &[u8]) -> Self {
            let mut files = HashMap::new();
            files.insert(PathBuf::from(path), bytes.to_vec());
            MemStore { files }
        }
    }

    #[async_trait]
    impl BackupStore for MemStore {
        async fn stat(&self, path: &Path) -> Result<Option<ArtifactStat>, StoreError> {
            Ok(self.files.get(path).map(|b| ArtifactStat {
                size_bytes: b.len() as u64,
            }))
        }

        async fn open(
            &self,
            path: &Path,
        ) -> Result<Pin<Box<dyn AsyncRead + Send>>, StoreError> {
            match self.files.get(path) {
                Some(bytes) => Ok(Box::pin(std::io::Cursor::new(bytes.clone()))),
                None => Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                }),
            }
        }

        async fn delete(&self, _path: &Path) -> Result<(), StoreError> {
            unreachable!("verification never deletes")
        }
    }

    struct StubAdapter {
        listing: Result<ObjectListing, AdapterError>,
    }

    impl StubAdapter {
        fn listing(listing: ObjectListing) -> Self {
            StubAdapter {
                listing: Ok(listing),
            }
        }
    }

    #[async_trait]
    impl DatabaseAdapter for StubAdapter {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Postgres
        }

        fn header_signature(&self) -> HeaderSignature {
            HeaderSignature {
                description: "PostgreSQL custom-format dump (PGDMP)",
                accepted: &[b"PGDMP"],
            }
        }

        async fn test_connection(&self) -> Result<(), AdapterError> {
            unreachable!()
        }

        async fn dump(
            &self,
            _req: &dbkeep_adapters::DumpRequest,
        ) -> Result<dbkeep_adapters::DumpArtifact, AdapterError> {
            unreachable!()
        }

        async fn restore(
            &self,
            _req: &dbkeep_adapters::RestoreRequest,
        ) -> Result<(), AdapterError> {
            unreachable!()
        }

        async fn list_objects(&self, _artifact: &Path) -> Result<ObjectListing, AdapterError> {
            match &self.listing {
                Ok(l) => Ok(l.clone()),
                Err(AdapterError::ToolFailed { tool, stderr }) => {
                    Err(AdapterError::ToolFailed {
                        tool: tool.clone(),
                        stderr: stderr.clone(),
                    })
                }
                Err(_) => unreachable!(),
            }
        }
    }

    fn record(path: &str, checksum: Option<String>) -> BackupRecord {
        BackupRecord {
            id: "b1".to_string(),
            database_kind: DatabaseKind::Postgres,
            database_name: "orders".to_string(),
            artifact_path: PathBuf::from(path),
            size_bytes: 0,
            checksum,
            created_at: datetime!(2026-01-10 03:00 UTC),
            scope: BackupScope::Full,
            status: BackupStatus::Completed,
            failure_reason: None,
        }
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    const ARTIFACT: &[u8] = b"PGDMP\x01\x0e\x04 table data follows";

    #[tokio::test]
    async fn intact_artifact_passes() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter =
            StubAdapter::listing(ObjectListing::Objects(vec!["orders".to_string()]));
        let rec = record("a.dump", Some(sha256_hex(ARTIFACT)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Passed);
        assert_eq!(report.detail.len(), 4);
        assert!(report.detail.iter().all(|c| c.outcome == VerifyOutcome::Passed));
    }

    #[tokio::test]
    async fn corrupted_header_names_the_header_check() {
        let mut bytes = ARTIFACT.to_vec();
        bytes[0] = b'X';
        let store = MemStore::with("a.dump", &bytes);
        let adapter = StubAdapter::listing(ObjectListing::Unsupported);
        let rec = record("a.dump", Some(sha256_hex(&bytes)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
        let last = report.detail.last().unwrap();
        assert_eq!(last.check, CheckKind::Header);
        assert_eq!(last.outcome, VerifyOutcome::Corrupted);
        // Short-circuited: no checksum or structure entries.
        assert_eq!(report.detail.len(), 2);
    }

    #[tokio::test]
    async fn missing_artifact_is_corrupted() {
        let store = MemStore {
            files: HashMap::new(),
        };
        let adapter = StubAdapter::listing(ObjectListing::Unsupported);
        let rec = record("gone.dump", None);
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
        assert_eq!(report.detail.len(), 1);
        assert_eq!(report.detail[0].check, CheckKind::Presence);
        assert_eq!(report.detail[0].message, "missing or empty");
    }

    #[tokio::test]
    async fn empty_artifact_is_corrupted() {
        let store = MemStore::with("a.dump", b"");
        let adapter = StubAdapter::listing(ObjectListing::Unsupported);
        let rec = record("a.dump", None);
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
        assert_eq!(report.detail[0].message, "missing or empty");
    }

    #[tokio::test]
    async fn checksum_mismatch_is_corrupted() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter = StubAdapter::listing(ObjectListing::Unsupported);
        let rec = record("a.dump", Some("00".repeat(32)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
        let last = report.detail.last().unwrap();
        assert_eq!(last.check, CheckKind::Checksum);
    }

    #[tokio::test]
    async fn absent_checksum_is_indeterminate_not_failed() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter =
            StubAdapter::listing(ObjectListing::Objects(vec!["orders".to_string()]));
        let rec = record("a.dump", None);
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Indeterminate);
        let checksum = report
            .detail
            .iter()
            .find(|c| c.check == CheckKind::Checksum)
            .unwrap();
        assert_eq!(checksum.outcome, VerifyOutcome::Indeterminate);
        // All four checks still ran.
        assert_eq!(report.detail.len(), 4);
    }

    #[tokio::test]
    async fn unsupported_listing_does_not_fail_report() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter = StubAdapter::listing(ObjectListing::Unsupported);
        let rec = record("a.dump", Some(sha256_hex(ARTIFACT)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Indeterminate);
    }

    #[tokio::test]
    async fn empty_object_listing_is_corrupted() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter = StubAdapter::listing(ObjectListing::Objects(Vec::new()));
        let rec = record("a.dump", Some(sha256_hex(ARTIFACT)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
    }

    #[tokio::test]
    async fn listing_tool_rejection_is_corrupted() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter = StubAdapter {
            listing: Err(AdapterError::ToolFailed {
                tool: "pg_restore".to_string(),
                stderr: "unexpected end of file".to_string(),
            }),
        };
        let rec = record("a.dump", Some(sha256_hex(ARTIFACT)));
        let report = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(report.result, VerifyOutcome::Corrupted);
    }

    #[tokio::test]
    async fn verification_is_idempotent() {
        let store = MemStore::with("a.dump", ARTIFACT);
        let adapter =
            StubAdapter::listing(ObjectListing::Objects(vec!["orders".to_string()]));
        let rec = record("a.dump", Some(sha256_hex(ARTIFACT)));
        let first = verify(&rec, &store, &adapter).await.unwrap();
        let second = verify(&rec, &store, &adapter).await.unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(first.detail.len(), second.detail.len());
    }
}
