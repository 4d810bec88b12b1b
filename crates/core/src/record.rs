use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    Mysql,
    Mongodb,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Mongodb => "mongodb",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "mysql" => Ok(DatabaseKind::Mysql),
            "mongodb" | "mongo" => Ok(DatabaseKind::Mongodb),
            other => Err(format!(
                "unknown database kind '{}' (expected postgres, mysql, or mongodb)",
                other
            )),
        }
    }
}

/// What a backup covers: the whole database, or a named subset of
/// tables/collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "objects")]
pub enum BackupScope {
    Full,
    Partial(Vec<String>),
}

/// Backup lifecycle status. Created as `Pending`, transitions exactly once
/// to `Completed` or `Failed`, never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One backup artifact as tracked by the catalog.
///
/// `id`, `database_kind`, `database_name`, `artifact_path`, and `created_at`
/// are immutable after creation. `checksum` and `size_bytes` are set exactly
/// once, when the dump completes; the checksum is never recomputed implicitly,
/// only re-verified against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub database_kind: DatabaseKind,
    pub database_name: String,
    pub artifact_path: PathBuf,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the finished artifact. None until completion.
    pub checksum: Option<String>,
    /// Sole ordering key for retention bucketing.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub scope: BackupScope,
    pub status: BackupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl BackupRecord {
    /// Create a new `Pending` record with a fresh opaque id.
    pub fn new(
        database_kind: DatabaseKind,
        database_name: impl Into<String>,
        artifact_path: PathBuf,
        scope: BackupScope,
        created_at: OffsetDateTime,
    ) -> Self {
        BackupRecord {
            id: Uuid::new_v4().to_string(),
            database_kind,
            database_name: database_name.into(),
            artifact_path,
            size_bytes: 0,
            checksum: None,
            created_at,
            scope,
            status: BackupStatus::Pending,
            failure_reason: None,
        }
    }

    /// A record stuck in `Pending` past the staleness threshold is treated
    /// as failed for reporting and retention, even without an explicit
    /// failure transition.
    pub fn is_stale_pending(&self, now: OffsetDateTime, threshold: Duration) -> bool {
        self.status == BackupStatus::Pending && now - self.created_at > threshold
    }
}

/// Which verification check produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Existence and non-zero size in the backup store.
    Presence,
    /// Leading bytes match the dump format's expected signature.
    Header,
    /// Streamed re-hash matches the recorded checksum.
    Checksum,
    /// Lightweight structural scan (object listing) where the format supports it.
    Structure,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckKind::Presence => "presence",
            CheckKind::Header => "header",
            CheckKind::Checksum => "checksum",
            CheckKind::Structure => "structure",
        };
        f.write_str(s)
    }
}

/// Verification outcome. Ordered by severity so that `max` yields the
/// worst outcome across checks: `Corrupted > Indeterminate > Passed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VerifyOutcome {
    Passed,
    /// Could not confirm, but no corruption detected.
    Indeterminate,
    Corrupted,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerifyOutcome::Passed => "passed",
            VerifyOutcome::Indeterminate => "indeterminate",
            VerifyOutcome::Corrupted => "corrupted",
        };
        f.write_str(s)
    }
}

/// Outcome of a single verification check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: CheckKind,
    pub outcome: VerifyOutcome,
    pub message: String,
}

impl CheckOutcome {
    pub fn new(check: CheckKind, outcome: VerifyOutcome, message: impl Into<String>) -> Self {
        CheckOutcome {
            check,
            outcome,
            message: message.into(),
        }
    }
}

/// One verification run over one backup artifact. Append-only history:
/// a record accumulates reports over time, none are ever mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub backup_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
    pub result: VerifyOutcome,
    pub detail: Vec<CheckOutcome>,
}

impl VerificationReport {
    /// Build a report from per-check outcomes. The overall result is the
    /// worst outcome across all checks performed.
    pub fn from_checks(
        backup_id: impl Into<String>,
        verified_at: OffsetDateTime,
        detail: Vec<CheckOutcome>,
    ) -> Self {
        let result = detail
            .iter()
            .map(|c| c.outcome)
            .max()
            .unwrap_or(VerifyOutcome::Indeterminate);
        VerificationReport {
            backup_id: backup_id.into(),
            verified_at,
            result,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn worst_outcome_wins() {
        let report = VerificationReport::from_checks(
            "b1",
            datetime!(2026-01-10 12:00 UTC),
            vec![
                CheckOutcome::new(CheckKind::Presence, VerifyOutcome::Passed, "ok"),
                CheckOutcome::new(CheckKind::Checksum, VerifyOutcome::Indeterminate, "none"),
                CheckOutcome::new(CheckKind::Header, VerifyOutcome::Corrupted, "bad magic"),
            ],
        );
        assert_eq!(report.result, VerifyOutcome::Corrupted);
    }

    #[test]
    fn indeterminate_does_not_fail_passed_checks() {
        let report = VerificationReport::from_checks(
            "b1",
            datetime!(2026-01-10 12:00 UTC),
            vec![
                CheckOutcome::new(CheckKind::Presence, VerifyOutcome::Passed, "ok"),
                CheckOutcome::new(CheckKind::Header, VerifyOutcome::Passed, "ok"),
                CheckOutcome::new(CheckKind::Structure, VerifyOutcome::Indeterminate, "n/a"),
            ],
        );
        assert_eq!(report.result, VerifyOutcome::Indeterminate);
    }

    #[test]
    fn stale_pending_detection() {
        let mut r = BackupRecord::new(
            DatabaseKind::Postgres,
            "orders",
            PathBuf::from("orders.dump"),
            BackupScope::Full,
            datetime!(2026-01-10 00:00 UTC),
        );
        let now = datetime!(2026-01-12 00:00 UTC);
        assert!(r.is_stale_pending(now, Duration::hours(24)));
        assert!(!r.is_stale_pending(now, Duration::hours(72)));
        r.status = BackupStatus::Completed;
        assert!(!r.is_stale_pending(now, Duration::hours(24)));
    }

    #[test]
    fn database_kind_parses_aliases() {
        assert_eq!("postgresql".parse::<DatabaseKind>(), Ok(DatabaseKind::Postgres));
        assert_eq!("MongoDB".parse::<DatabaseKind>(), Ok(DatabaseKind::Mongodb));
        assert!("oracle".parse::<DatabaseKind>().is_err());
    }
}
