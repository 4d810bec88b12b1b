//! `cleanup` and `retention-stats`.

use std::collections::BTreeMap;
use std::process;

use serde_json::json;
use time::OffsetDateTime;

use dbkeep_core::{
    retention, retention_stats, BackupRecord, DeleteReason, EventKind, NotificationEvent,
};
use dbkeep_storage::{Catalog, JsonCatalog, LocalStore, RecordFilter};

use crate::config::Config;
use crate::notify::SlackNotifier;
use crate::runner::delete_with_retry;
use crate::{report_error, OutputFormat};

struct Candidate {
    record: BackupRecord,
    reason: DeleteReason,
}

fn reason_label(reason: DeleteReason) -> &'static str {
    match reason {
        DeleteReason::Expired => "expired",
        DeleteReason::Failed => "failed",
        DeleteReason::StalePending => "stale pending",
    }
}

pub(crate) async fn cmd_cleanup(
    cfg: &Config,
    dry_run: bool,
    keep_daily: Option<u32>,
    keep_weekly: Option<u32>,
    keep_monthly: Option<u32>,
    output: OutputFormat,
    quiet: bool,
) {
    let mut policy = cfg.policy();
    if let Some(n) = keep_daily {
        policy.keep_daily = n;
    }
    if let Some(n) = keep_weekly {
        policy.keep_weekly = n;
    }
    if let Some(n) = keep_monthly {
        policy.keep_monthly = n;
    }

    let catalog = JsonCatalog::new(cfg.catalog_path());
    let store = LocalStore::new(&cfg.backup_dir);

    let records = match catalog.query(&RecordFilter::default()).await {
        Ok(records) => records,
        Err(e) => {
            report_error(&format!("catalog error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    // The policy is per logical database: each one gets its own daily,
    // weekly, and monthly windows.
    let mut grouped: BTreeMap<String, Vec<BackupRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.database_name.clone())
            .or_default()
            .push(record);
    }

    let now = OffsetDateTime::now_utc();
    let mut retained = 0usize;
    let mut in_flight = 0usize;
    let mut candidates: Vec<Candidate> = Vec::new();
    for (_, records) in grouped {
        let plan = retention::plan(&records, &policy, now);
        retained += plan.retain.len();
        in_flight += plan.in_flight.len();
        let mut by_id: BTreeMap<&str, &BackupRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        for candidate in plan.delete {
            if let Some(record) = by_id.remove(candidate.id.as_str()) {
                candidates.push(Candidate {
                    record: record.clone(),
                    reason: candidate.reason,
                });
            }
        }
    }

    if dry_run {
        if !quiet {
            match output {
                OutputFormat::Text => {
                    println!(
                        "Would delete {} backups ({} retained, {} in flight)",
                        candidates.len(),
                        retained,
                        in_flight
                    );
                    for c in &candidates {
                        println!(
                            "  {} [{}] {}",
                            c.record.artifact_path.display(),
                            reason_label(c.reason),
                            c.record.database_name
                        );
                    }
                }
                OutputFormat::Json => {
                    let deletes: Vec<_> = candidates
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.record.id,
                                "database": c.record.database_name,
                                "artifact": c.record.artifact_path.display().to_string(),
                                "reason": reason_label(c.reason),
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        json!({
                            "dry_run": true,
                            "retained": retained,
                            "in_flight": in_flight,
                            "would_delete": deletes,
                        })
                    );
                }
            }
        }
        return;
    }

    let mut deleted = 0usize;
    let mut freed_bytes = 0u64;
    let mut failures: Vec<(String, String)> = Vec::new();
    for c in &candidates {
        // Artifact first, catalog entry second: a crash between the two
        // leaves an orphaned entry the next run can finish off.
        match delete_with_retry(&store, &c.record.artifact_path).await {
            Ok(removed_file) => {
                if removed_file {
                    freed_bytes += c.record.size_bytes;
                }
                if let Err(e) = catalog.delete(&c.record.id).await {
                    failures.push((c.record.id.clone(), e.to_string()));
                    continue;
                }
                deleted += 1;
                tracing::info!(
                    id = %c.record.id,
                    artifact = %c.record.artifact_path.display(),
                    reason = reason_label(c.reason),
                    "backup deleted"
                );
            }
            Err(e) => failures.push((c.record.id.clone(), e.to_string())),
        }
    }

    SlackNotifier::new(&cfg.slack).send(&NotificationEvent::new(
        EventKind::CleanupSummary,
        "all",
        OffsetDateTime::now_utc(),
        format!(
            "{deleted} deleted, {retained} retained, {} failed, {freed_bytes} bytes freed",
            failures.len()
        ),
    ));

    if !quiet {
        match output {
            OutputFormat::Text => {
                println!(
                    "Deleted {} backups, freed {} bytes ({} retained, {} in flight)",
                    deleted, freed_bytes, retained, in_flight
                );
                for (id, msg) in &failures {
                    println!("  failed to delete {id}: {msg}");
                }
            }
            OutputFormat::Json => {
                let failures: Vec<_> = failures
                    .iter()
                    .map(|(id, msg)| json!({ "id": id, "error": msg }))
                    .collect();
                println!(
                    "{}",
                    json!({
                        "deleted": deleted,
                        "freed_bytes": freed_bytes,
                        "retained": retained,
                        "in_flight": in_flight,
                        "failures": failures,
                    })
                );
            }
        }
    }
    if !failures.is_empty() {
        process::exit(1);
    }
}

pub(crate) async fn cmd_retention_stats(cfg: &Config, output: OutputFormat, quiet: bool) {
    let catalog = JsonCatalog::new(cfg.catalog_path());
    let records = match catalog.query(&RecordFilter::default()).await {
        Ok(records) => records,
        Err(e) => {
            report_error(&format!("catalog error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let policy = cfg.policy();
    let stats = retention_stats(&records, OffsetDateTime::now_utc(), policy.stale_pending_after);

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            if stats.databases.is_empty() {
                println!("No backups recorded");
                return;
            }
            for db in &stats.databases {
                println!("{}:", db.database_name);
                println!("  total: {}", db.total);
                println!("  completed: {}", db.completed);
                println!("  failed: {}", db.failed);
                if db.stale_pending > 0 {
                    println!("  stale pending: {}", db.stale_pending);
                }
                match db.newest_completed_age_secs {
                    Some(secs) => println!("  newest completed: {}h ago", secs / 3600),
                    None => println!("  newest completed: never"),
                }
                println!(
                    "  by age: {} <1d, {} <7d, {} <30d, {} older",
                    db.by_age.last_day, db.by_age.last_week, db.by_age.last_month, db.by_age.older
                );
            }
        }
        OutputFormat::Json => {
            if let Ok(s) = serde_json::to_string_pretty(&stats) {
                println!("{}", s);
            }
        }
    }
}
