//! `backup` and `backup-all`.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;

use dbkeep_core::DatabaseKind;
use dbkeep_storage::JsonCatalog;

use crate::config::{Config, DatabaseTarget};
use crate::notify::SlackNotifier;
use crate::runner::run_backup;
use crate::{report_error, OutputFormat};

/// Connection flags from the command line; each one overrides the
/// corresponding config field for this invocation only.
pub(crate) struct BackupArgs {
    pub db_type: Option<DatabaseKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub tables: Vec<String>,
}

/// Merge flags over the configured target. A target can also be fully
/// described on the command line with `--db-type` and `--database`, with
/// no config file at all.
fn resolve_target(cfg: &Config, args: &BackupArgs) -> Result<DatabaseTarget, String> {
    let base = cfg.target(args.database.as_deref());
    let mut target = match (base, args.db_type) {
        (Some(base), _) => base.clone(),
        (None, Some(kind)) => {
            let name = args
                .database
                .clone()
                .ok_or("no database configured; pass --database")?;
            DatabaseTarget {
                kind,
                name,
                host: "localhost".to_string(),
                port: None,
                user: String::new(),
                password: String::new(),
            }
        }
        (None, None) => {
            return Err(match &args.database {
                Some(name) => format!("database {name} is not configured"),
                None => "no database configured; pass --database and --db-type".to_string(),
            });
        }
    };
    if let Some(kind) = args.db_type {
        target.kind = kind;
    }
    if let Some(host) = &args.host {
        target.host = host.clone();
    }
    if let Some(port) = args.port {
        target.port = Some(port);
    }
    if let Some(user) = &args.user {
        target.user = user.clone();
    }
    if let Some(password) = &args.password {
        target.password = password.clone();
    }
    Ok(target)
}

pub(crate) async fn cmd_backup(
    cfg: &Config,
    args: BackupArgs,
    output: OutputFormat,
    quiet: bool,
) {
    let mut cfg = cfg.clone();
    if let Some(dir) = &args.output_dir {
        cfg.backup_dir = dir.clone();
        cfg.catalog = None;
    }
    let target = match resolve_target(&cfg, &args) {
        Ok(target) => target,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(2);
        }
    };

    let catalog = JsonCatalog::new(cfg.catalog_path());
    let notifier = SlackNotifier::new(&cfg.slack);

    match run_backup(&cfg, &target, &args.tables, &catalog, &notifier).await {
        Ok(record) => {
            if !quiet {
                match output {
                    OutputFormat::Text => {
                        println!(
                            "Backed up {} to {} ({} bytes)",
                            record.database_name,
                            cfg.backup_dir.join(&record.artifact_path).display(),
                            record.size_bytes
                        );
                    }
                    OutputFormat::Json => match serde_json::to_string_pretty(&record) {
                        Ok(s) => println!("{}", s),
                        Err(e) => {
                            report_error(&format!("serialization error: {e}"), output, quiet);
                            process::exit(1);
                        }
                    },
                }
            }
        }
        Err(msg) => {
            report_error(&format!("backup failed: {msg}"), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) async fn cmd_backup_all(cfg: &Config, output: OutputFormat, quiet: bool) {
    if cfg.databases.is_empty() {
        report_error("no databases configured", output, quiet);
        process::exit(2);
    }

    let cfg_shared = Arc::new(cfg.clone());
    let catalog = Arc::new(JsonCatalog::new(cfg.catalog_path()));
    let notifier = Arc::new(SlackNotifier::new(&cfg.slack));

    // One task per target; the catalog serializes its own writers.
    let mut tasks = JoinSet::new();
    for target in cfg.databases.clone() {
        let cfg = Arc::clone(&cfg_shared);
        let catalog = Arc::clone(&catalog);
        let notifier = Arc::clone(&notifier);
        tasks.spawn(async move {
            let result = run_backup(&cfg, &target, &[], &catalog, &notifier).await;
            (target.name, result)
        });
    }

    let mut succeeded = 0usize;
    let mut failed: Vec<(String, String)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(_))) => succeeded += 1,
            Ok((name, Err(msg))) => failed.push((name, msg)),
            Err(e) => failed.push(("<task>".to_string(), e.to_string())),
        }
    }
    failed.sort();

    if !quiet {
        match output {
            OutputFormat::Text => {
                println!("{} of {} backups completed", succeeded, cfg.databases.len());
                for (name, msg) in &failed {
                    println!("  {name}: {msg}");
                }
            }
            OutputFormat::Json => {
                let failures: Vec<_> = failed
                    .iter()
                    .map(|(name, msg)| json!({ "database": name, "error": msg }))
                    .collect();
                println!(
                    "{}",
                    json!({
                        "total": cfg.databases.len(),
                        "succeeded": succeeded,
                        "failures": failures,
                    })
                );
            }
        }
    }
    if !failed.is_empty() {
        process::exit(1);
    }
}
