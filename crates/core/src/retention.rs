//! Retention policy engine.
//!
//! A pure function over the catalog records of one logical database:
//! given the daily/weekly/monthly keep counts it partitions the records
//! into a retain set and a delete list. It never touches storage; the
//! caller applies (or merely prints) the plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::record::{BackupRecord, BackupStatus};

/// Keep counts for the three bucketing rules, plus the threshold after
/// which a record stuck in `Pending` counts as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// The N most recent completed backups are retained unconditionally.
    pub keep_daily: u32,
    /// One representative per ISO week, for the N most recent weeks present
    /// among records older than the daily window.
    pub keep_weekly: u32,
    /// One representative per calendar month, same window as weekly.
    pub keep_monthly: u32,
    pub stale_pending_after: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            keep_daily: 7,
            keep_weekly: 4,
            keep_monthly: 12,
            stale_pending_after: Duration::hours(24),
        }
    }
}

/// Why a record landed on the delete side of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// Completed, but not selected by any retention rule.
    Expired,
    /// Explicitly failed backup; eligible for cleanup regardless of windows.
    Failed,
    /// Stuck in `Pending` past the staleness threshold.
    StalePending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteCandidate {
    pub id: String,
    pub reason: DeleteReason,
}

/// The retain/delete partition for one database.
///
/// `in_flight` holds `Pending` records younger than the staleness
/// threshold: never retained by policy, but not safe to delete while a
/// concurrent dump may still be writing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    pub retain: BTreeSet<String>,
    pub delete: Vec<DeleteCandidate>,
    pub in_flight: Vec<String>,
}

/// Compute the retention partition for one database's records.
///
/// Deterministic: identical records, policy, and `now` always produce an
/// identical plan. Ordering is by `created_at` descending with ties broken
/// by ascending `id`, so the plan is stable under equal timestamps.
pub fn plan(
    records: &[BackupRecord],
    policy: &RetentionPolicy,
    now: OffsetDateTime,
) -> RetentionPlan {
    let mut out = RetentionPlan::default();

    let mut completed: Vec<&BackupRecord> = Vec::new();
    for r in records {
        match r.status {
            BackupStatus::Completed => completed.push(r),
            BackupStatus::Failed => out.delete.push(DeleteCandidate {
                id: r.id.clone(),
                reason: DeleteReason::Failed,
            }),
            BackupStatus::Pending => {
                if r.is_stale_pending(now, policy.stale_pending_after) {
                    out.delete.push(DeleteCandidate {
                        id: r.id.clone(),
                        reason: DeleteReason::StalePending,
                    });
                } else {
                    out.in_flight.push(r.id.clone());
                }
            }
        }
    }

    completed.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Daily rule: the most recent keep_daily records survive unconditionally.
    let daily_end = (policy.keep_daily as usize).min(completed.len());
    for r in &completed[..daily_end] {
        out.retain.insert(r.id.clone());
    }

    // Weekly and monthly rules run over records older than the daily window.
    // The windows overlap: one record may represent both its week and its
    // month, and the retain set is a union.
    let older = &completed[daily_end..];
    for id in bucket_representatives(older, policy.keep_weekly, |r| {
        let (iso_year, iso_week, _) = r.created_at.date().to_iso_week_date();
        (iso_year, iso_week)
    }) {
        out.retain.insert(id.to_string());
    }
    for id in bucket_representatives(older, policy.keep_monthly, |r| {
        let date = r.created_at.date();
        (date.year(), u8::from(date.month()))
    }) {
        out.retain.insert(id.to_string());
    }

    for r in older {
        if !out.retain.contains(&r.id) {
            out.delete.push(DeleteCandidate {
                id: r.id.clone(),
                reason: DeleteReason::Expired,
            });
        }
    }

    out
}

/// Pick one representative per bucket from the `keep` most recent buckets
/// actually present.
///
/// `records` must be sorted newest-first with ties broken by ascending id;
/// the first record seen in a bucket is therefore its representative (most
/// recent, smallest id on equal timestamps). Buckets with no records do not
/// consume a slot.
fn bucket_representatives<'a, K: Ord>(
    records: &[&'a BackupRecord],
    keep: u32,
    key: impl Fn(&BackupRecord) -> K,
) -> Vec<&'a str> {
    let mut reps: BTreeMap<K, &'a str> = BTreeMap::new();
    for r in records {
        reps.entry(key(r)).or_insert(r.id.as_str());
    }
    reps.into_values().rev().take(keep as usize).collect()
}
