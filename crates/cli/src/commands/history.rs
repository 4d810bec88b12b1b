//! `history` and `stats`.

use std::process;

use time::format_description::well_known::Rfc3339;

use dbkeep_core::{backup_stats, BackupStatus};
use dbkeep_storage::{Catalog, JsonCatalog, RecordFilter};

use crate::config::Config;
use crate::{report_error, OutputFormat};

pub(crate) async fn cmd_history(
    cfg: &Config,
    database: Option<&str>,
    limit: usize,
    output: OutputFormat,
    quiet: bool,
) {
    let catalog = JsonCatalog::new(cfg.catalog_path());
    let filter = RecordFilter {
        database_name: database.map(str::to_string),
        limit: Some(limit),
        ..RecordFilter::default()
    };
    let records = match catalog.query(&filter).await {
        Ok(records) => records,
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
            if records.is_empty() {
                println!("No backups recorded");
                return;
            }
            for r in &records {
                let when = r
                    .created_at
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| r.created_at.to_string());
                let size = match r.status {
                    BackupStatus::Completed => format!("{} bytes", r.size_bytes),
                    BackupStatus::Pending => "pending".to_string(),
                    BackupStatus::Failed => r
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "failed".to_string()),
                };
                println!(
                    "{}  {:9}  {}  {}  {}",
                    when,
                    r.status.to_string(),
                    r.database_name,
                    r.artifact_path.display(),
                    size
                );
            }
        }
        OutputFormat::Json => {
            if let Ok(s) = serde_json::to_string_pretty(&records) {
                println!("{}", s);
            }
        }
    }
}

pub(crate) async fn cmd_stats(cfg: &Config, output: OutputFormat, quiet: bool) {
    let catalog = JsonCatalog::new(cfg.catalog_path());
    let records = match catalog.query(&RecordFilter::default()).await {
        Ok(records) => records,
        Err(e) => {
            report_error(&format!("catalog error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let stats = backup_stats(&records);
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!("Total backups: {}", stats.total);
            println!("  completed: {}", stats.completed);
            println!("  failed: {}", stats.failed);
            println!("  pending: {}", stats.pending);
            println!("Total size: {} bytes", stats.total_completed_bytes);
            for (kind, count) in &stats.by_kind {
                println!("  {kind}: {count}");
            }
            println!(
                "Databases: {}",
                stats
                    .databases
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        OutputFormat::Json => {
            if let Ok(s) = serde_json::to_string_pretty(&stats) {
                println!("{}", s);
            }
        }
    }
}
