//! `verify` and `verify-history`.

use std::path::Path;
use std::process;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use dbkeep_adapters::{adapter_for, ConnectionProfile};
use dbkeep_core::{
    verification_stats, BackupRecord, BackupScope, DatabaseKind, EventKind, NotificationEvent,
    VerificationReport, VerifyOutcome,
};
use dbkeep_storage::{Catalog, JsonCatalog, LocalStore, RecordFilter};

use crate::config::Config;
use crate::notify::SlackNotifier;
use crate::{report_error, OutputFormat};

/// Match a command-line artifact path against a catalog record. Records
/// store paths relative to the backup directory, so both the stripped
/// path and the bare file name are tried.
async fn find_record(
    catalog: &JsonCatalog,
    cfg: &Config,
    artifact: &Path,
) -> Option<BackupRecord> {
    let relative = artifact.strip_prefix(&cfg.backup_dir).unwrap_or(artifact);
    let records = catalog.query(&RecordFilter::default()).await.ok()?;
    records.into_iter().find(|r| {
        r.artifact_path == relative
            || (artifact.file_name().is_some()
                && r.artifact_path.file_name() == artifact.file_name())
    })
}

fn print_report(report: &VerificationReport, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!("Verification result: {}", report.result);
            for check in &report.detail {
                println!("  {}: {} ({})", check.check, check.outcome, check.message);
            }
        }
        OutputFormat::Json => {
            if let Ok(s) = serde_json::to_string_pretty(report) {
                println!("{}", s);
            }
        }
    }
}

pub(crate) async fn cmd_verify(
    cfg: &Config,
    artifact: &Path,
    db_type: DatabaseKind,
    output: OutputFormat,
    quiet: bool,
) {
    let catalog = JsonCatalog::new(cfg.catalog_path());
    let store = LocalStore::new(&cfg.backup_dir);

    // Prefer the catalog record: it carries the recorded checksum, which
    // an ad-hoc file cannot be checked against.
    let known = find_record(&catalog, cfg, artifact).await;
    let record = match &known {
        Some(record) => record.clone(),
        None => {
            let path = if artifact.is_absolute() || cfg.backup_dir.join(artifact).exists() {
                artifact.to_path_buf()
            } else {
                match std::path::absolute(artifact) {
                    Ok(p) => p,
                    Err(_) => artifact.to_path_buf(),
                }
            };
            let name = artifact
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            BackupRecord::new(
                db_type,
                name,
                path,
                BackupScope::Full,
                OffsetDateTime::now_utc(),
            )
        }
    };

    let kind = known.as_ref().map_or(db_type, |r| r.database_kind);
    let adapter = adapter_for(kind, ConnectionProfile::default());
    let report = match dbkeep_verify::verify(&record, &store, adapter.as_ref()).await {
        Ok(report) => report,
        Err(e) => {
            report_error(&format!("verification error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    // Ad-hoc verifications leave no trace; only catalog-known backups
    // accumulate history.
    if known.is_some() {
        if let Err(e) = catalog.record_verification(report.clone()).await {
            report_error(&format!("could not record verification: {e}"), output, quiet);
            process::exit(1);
        }
    }

    print_report(&report, output, quiet);

    if report.result == VerifyOutcome::Corrupted {
        let failing = report
            .detail
            .iter()
            .find(|c| c.outcome == VerifyOutcome::Corrupted)
            .map(|c| format!("{}: {}", c.check, c.message))
            .unwrap_or_else(|| "corrupted".to_string());
        SlackNotifier::new(&cfg.slack).send(&NotificationEvent::new(
            EventKind::VerificationFailed,
            &record.database_name,
            OffsetDateTime::now_utc(),
            failing,
        ));
        process::exit(1);
    }
}

pub(crate) async fn cmd_verify_history(
    cfg: &Config,
    backup_file: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let catalog = JsonCatalog::new(cfg.catalog_path());

    let backup_id = match backup_file {
        Some(path) => match find_record(&catalog, cfg, path).await {
            Some(record) => Some(record.id),
            None => {
                report_error(
                    &format!("no backup record for {}", path.display()),
                    output,
                    quiet,
                );
                process::exit(2);
            }
        },
        None => None,
    };

    let reports = match catalog.reports(backup_id.as_deref()).await {
        Ok(reports) => reports,
        Err(e) => {
            report_error(&format!("catalog error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            if reports.is_empty() {
                println!("No verification reports");
                return;
            }
            for report in &reports {
                let when = report
                    .verified_at
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| report.verified_at.to_string());
                println!("{}  {}  {}", when, report.result, report.backup_id);
            }
            let stats = verification_stats(&reports);
            println!(
                "{} passed, {} indeterminate, {} corrupted",
                stats.passed, stats.indeterminate, stats.corrupted
            );
        }
        OutputFormat::Json => {
            if let Ok(s) = serde_json::to_string_pretty(&reports) {
                println!("{}", s);
            }
        }
    }
}
