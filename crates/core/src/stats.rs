//! Read-only history/stats projections over catalog query results.
//!
//! Pure functions: slices of records in, summary values out. The CLI
//! reporting commands (`stats`, `history`, `retention-stats`) are thin
//! wrappers around these.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::record::{BackupRecord, BackupStatus, VerificationReport, VerifyOutcome};

/// Backup counts grouped by age of `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgeBuckets {
    pub last_day: usize,
    pub last_week: usize,
    pub last_month: usize,
    pub older: usize,
}

/// Aggregate counts over all catalog records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    /// Sum of `size_bytes` across completed records.
    pub total_completed_bytes: u64,
    pub by_kind: BTreeMap<String, usize>,
    pub databases: BTreeSet<String>,
}

pub fn backup_stats(records: &[BackupRecord]) -> BackupStats {
    let mut stats = BackupStats::default();
    for r in records {
        stats.total += 1;
        match r.status {
            BackupStatus::Completed => {
                stats.completed += 1;
                stats.total_completed_bytes += r.size_bytes;
            }
            BackupStatus::Failed => stats.failed += 1,
            BackupStatus::Pending => stats.pending += 1,
        }
        *stats
            .by_kind
            .entry(r.database_kind.to_string())
            .or_insert(0) += 1;
        stats.databases.insert(r.database_name.clone());
    }
    stats
}

/// Per-database retention view.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseRetention {
    pub database_name: String,
    pub total: usize,
    pub completed: usize,
    /// Explicit failures plus records stuck `Pending` past the staleness
    /// threshold, which are reported as failed here even though no failure
    /// transition was ever recorded.
    pub failed: usize,
    pub stale_pending: usize,
    /// Age in seconds of the most recent completed backup, if any.
    pub newest_completed_age_secs: Option<i64>,
    pub by_age: AgeBuckets,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionStats {
    pub databases: Vec<DatabaseRetention>,
}

pub fn retention_stats(
    records: &[BackupRecord],
    now: OffsetDateTime,
    stale_pending_after: Duration,
) -> RetentionStats {
    let mut grouped: BTreeMap<&str, Vec<&BackupRecord>> = BTreeMap::new();
    for r in records {
        grouped.entry(r.database_name.as_str()).or_default().push(r);
    }

    let databases = grouped
        .into_iter()
        .map(|(name, records)| {
            let mut entry = DatabaseRetention {
                database_name: name.to_string(),
                total: records.len(),
                completed: 0,
                failed: 0,
                stale_pending: 0,
                newest_completed_age_secs: None,
                by_age: AgeBuckets::default(),
            };
            let mut newest_completed: Option<OffsetDateTime> = None;
            for r in records {
                match r.status {
                    BackupStatus::Completed => {
                        entry.completed += 1;
                        if newest_completed.map_or(true, |t| r.created_at > t) {
                            newest_completed = Some(r.created_at);
                        }
                    }
                    BackupStatus::Failed => entry.failed += 1,
                    BackupStatus::Pending => {
                        if r.is_stale_pending(now, stale_pending_after) {
                            entry.stale_pending += 1;
                            entry.failed += 1;
                        }
                    }
                }
                let age = now - r.created_at;
                if age < Duration::days(1) {
                    entry.by_age.last_day += 1;
                } else if age < Duration::days(7) {
                    entry.by_age.last_week += 1;
                } else if age < Duration::days(30) {
                    entry.by_age.last_month += 1;
                } else {
                    entry.by_age.older += 1;
                }
            }
            entry.newest_completed_age_secs =
                newest_completed.map(|t| (now - t).whole_seconds());
            entry
        })
        .collect();

    RetentionStats { databases }
}

/// Pass/fail counts over verification history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationStats {
    pub passed: usize,
    pub indeterminate: usize,
    pub corrupted: usize,
}

pub fn verification_stats(reports: &[VerificationReport]) -> VerificationStats {
    let mut stats = VerificationStats::default();
    for r in reports {
        match r.result {
            VerifyOutcome::Passed => stats.passed += 1,
            VerifyOutcome::Indeterminate => stats.indeterminate += 1,
            VerifyOutcome::Corrupted => stats.corrupted += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BackupScope, CheckKind, CheckOutcome, DatabaseKind};
    use std::path::PathBuf;
    use time::macros::datetime;

    fn record(
        id: &str,
        db: &str,
        created_at: OffsetDateTime,
        status: BackupStatus,
    ) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            database_kind: DatabaseKind::Postgres,
            database_name: db.to_string(),
            artifact_path: PathBuf::from(format!("{id}.dump")),
            size_bytes: if status == BackupStatus::Completed { 2048 } else { 0 },
            checksum: None,
            created_at,
            scope: BackupScope::Full,
            status,
            failure_reason: None,
        }
    }

    const NOW: OffsetDateTime = datetime!(2026-02-01 00:00 UTC);

    #[test]
    fn backup_stats_counts_by_status_and_kind() {
        let records = vec![
            record("a", "orders", datetime!(2026-01-30 00:00 UTC), BackupStatus::Completed),
            record("b", "orders", datetime!(2026-01-29 00:00 UTC), BackupStatus::Failed),
            record("c", "users", datetime!(2026-01-28 00:00 UTC), BackupStatus::Completed),
        ];
        let s = backup_stats(&records);
        assert_eq!(s.total, 3);
        assert_eq!(s.completed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total_completed_bytes, 4096);
        assert_eq!(s.by_kind.get("postgres"), Some(&3));
        assert_eq!(s.databases.len(), 2);
    }

    #[test]
    fn stuck_pending_reported_as_failed() {
        // Scenario D: a record pending past the threshold counts as failed
        // in retention-stats without any explicit transition.
        let records = vec![record(
            "p",
            "orders",
            datetime!(2026-01-20 00:00 UTC),
            BackupStatus::Pending,
        )];
        let s = retention_stats(&records, NOW, Duration::hours(24));
        assert_eq!(s.databases.len(), 1);
        assert_eq!(s.databases[0].stale_pending, 1);
        assert_eq!(s.databases[0].failed, 1);
        assert_eq!(s.databases[0].completed, 0);
    }

    #[test]
    fn fresh_pending_not_reported_as_failed() {
        let records = vec![record(
            "p",
            "orders",
            datetime!(2026-01-31 18:00 UTC),
            BackupStatus::Pending,
        )];
        let s = retention_stats(&records, NOW, Duration::hours(24));
        assert_eq!(s.databases[0].stale_pending, 0);
        assert_eq!(s.databases[0].failed, 0);
    }

    #[test]
    fn newest_completed_age_per_database() {
        let records = vec![
            record("a", "orders", datetime!(2026-01-31 00:00 UTC), BackupStatus::Completed),
            record("b", "orders", datetime!(2026-01-20 00:00 UTC), BackupStatus::Completed),
        ];
        let s = retention_stats(&records, NOW, Duration::hours(24));
        assert_eq!(s.databases[0].newest_completed_age_secs, Some(86_400));
    }

    #[test]
    fn verification_counts() {
        let report = |outcome| {
            VerificationReport::from_checks(
                "b1",
                datetime!(2026-01-30 00:00 UTC),
                vec![CheckOutcome::new(CheckKind::Presence, outcome, "x")],
            )
        };
        let reports = vec![
            report(VerifyOutcome::Passed),
            report(VerifyOutcome::Passed),
            report(VerifyOutcome::Corrupted),
        ];
        let s = verification_stats(&reports);
        assert_eq!(s.passed, 2);
        assert_eq!(s.corrupted, 1);
        assert_eq!(s.indeterminate, 0);
    }
}
