//! `restore`.

use std::path::{Path, PathBuf};
use std::process;

use serde_json::json;

use dbkeep_adapters::{adapter_for, RestoreRequest};

use crate::config::Config;
use crate::{report_error, OutputFormat};

/// A backup file can be named as given on disk or relative to the
/// backup directory.
fn locate_artifact(cfg: &Config, backup_file: &Path) -> Option<PathBuf> {
    if backup_file.exists() {
        return Some(backup_file.to_path_buf());
    }
    let in_store = cfg.backup_dir.join(backup_file);
    in_store.exists().then_some(in_store)
}

pub(crate) async fn cmd_restore(
    cfg: &Config,
    backup_file: &Path,
    database: Option<&str>,
    target_db: Option<String>,
    tables: Vec<String>,
    output: OutputFormat,
    quiet: bool,
) {
    let Some(target) = cfg.target(database) else {
        report_error(
            &match database {
                Some(name) => format!("database {name} is not configured"),
                None => "no database configured".to_string(),
            },
            output,
            quiet,
        );
        process::exit(2);
    };
    let Some(backup_path) = locate_artifact(cfg, backup_file) else {
        report_error(
            &format!("backup file not found: {}", backup_file.display()),
            output,
            quiet,
        );
        process::exit(2);
    };

    let restored_into = target_db.clone().unwrap_or_else(|| target.name.clone());
    let adapter = adapter_for(target.kind, target.profile());
    let req = RestoreRequest {
        backup_path: backup_path.clone(),
        target_database: target_db,
        objects: tables,
        timeout: cfg.dump_timeout(),
    };

    tracing::info!(
        database = %restored_into,
        artifact = %backup_path.display(),
        "restore started"
    );
    match adapter.restore(&req).await {
        Ok(()) => {
            if !quiet {
                match output {
                    OutputFormat::Text => {
                        println!(
                            "Restored {} into {}",
                            backup_path.display(),
                            restored_into
                        );
                    }
                    OutputFormat::Json => {
                        println!(
                            "{}",
                            json!({
                                "restored": backup_path.display().to_string(),
                                "database": restored_into,
                            })
                        );
                    }
                }
            }
        }
        Err(e) => {
            report_error(&format!("restore failed: {e}"), output, quiet);
            process::exit(1);
        }
    }
}
