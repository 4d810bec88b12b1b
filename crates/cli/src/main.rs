mod commands;
mod config;
mod notify;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use dbkeep_core::DatabaseKind;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Database backup lifecycle toolchain.
#[derive(Parser)]
#[command(name = "dbkeep", version, about = "Database backup lifecycle toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the config file (default: ./dbkeep.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up one database
    Backup {
        /// Database kind (default: from config)
        #[arg(long)]
        db_type: Option<DatabaseKind>,
        /// Database host (default: from config)
        #[arg(long)]
        host: Option<String>,
        /// Database port (default: engine default)
        #[arg(long)]
        port: Option<u16>,
        /// Database username
        #[arg(long)]
        user: Option<String>,
        /// Database password
        #[arg(long)]
        password: Option<String>,
        /// Logical database name
        #[arg(long)]
        database: Option<String>,
        /// Directory to store backups (default: from config)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Limit the backup to these tables/collections
        #[arg(long)]
        tables: Vec<String>,
    },

    /// Back up every configured database, one concurrent task each
    BackupAll,

    /// Restore a database from a backup artifact
    Restore {
        /// Path to the backup artifact
        backup_file: PathBuf,
        /// Configured database to restore (default: first in config)
        #[arg(long)]
        database: Option<String>,
        /// Restore into a differently named database
        #[arg(long)]
        target_db: Option<String>,
        /// Restore only these tables/collections
        #[arg(long)]
        tables: Vec<String>,
    },

    /// Verify one backup artifact without restoring it
    Verify {
        /// Path to the backup artifact
        artifact: PathBuf,
        /// Database kind the artifact was dumped from
        #[arg(long)]
        db_type: DatabaseKind,
    },

    /// List verification reports
    VerifyHistory {
        /// Only reports for this backup artifact
        #[arg(long)]
        backup_file: Option<PathBuf>,
    },

    /// Apply the retention policy, deleting expired backups
    Cleanup {
        /// Print the would-be delete set without touching anything
        #[arg(long)]
        dry_run: bool,
        /// Override the configured daily keep count
        #[arg(long)]
        keep_daily: Option<u32>,
        /// Override the configured weekly keep count
        #[arg(long)]
        keep_weekly: Option<u32>,
        /// Override the configured monthly keep count
        #[arg(long)]
        keep_monthly: Option<u32>,
    },

    /// Per-database retention overview
    RetentionStats,

    /// Recent backups, newest first
    History {
        /// Only backups of this database
        #[arg(long)]
        database: Option<String>,
        /// Maximum number of entries
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Aggregate backup statistics
    Stats,

    /// Probe connectivity for every configured database
    TestConnection,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dbkeep=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match config::Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            report_error(&format!("config error: {e}"), cli.output, cli.quiet);
            process::exit(2);
        }
    };

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

    match cli.command {
        Commands::Backup {
            db_type,
            host,
            port,
            user,
            password,
            database,
            output_dir,
            tables,
        } => {
            rt.block_on(commands::backup::cmd_backup(
                &cfg,
                commands::backup::BackupArgs {
                    db_type,
                    host,
                    port,
                    user,
                    password,
                    database,
                    output_dir,
                    tables,
                },
                cli.output,
                cli.quiet,
            ));
        }
        Commands::BackupAll => {
            rt.block_on(commands::backup::cmd_backup_all(&cfg, cli.output, cli.quiet));
        }
        Commands::Restore {
            backup_file,
            database,
            target_db,
            tables,
        } => {
            rt.block_on(commands::restore::cmd_restore(
                &cfg,
                &backup_file,
                database.as_deref(),
                target_db,
                tables,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Verify { artifact, db_type } => {
            rt.block_on(commands::verify::cmd_verify(
                &cfg, &artifact, db_type, cli.output, cli.quiet,
            ));
        }
        Commands::VerifyHistory { backup_file } => {
            rt.block_on(commands::verify::cmd_verify_history(
                &cfg,
                backup_file.as_deref(),
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Cleanup {
            dry_run,
            keep_daily,
            keep_weekly,
            keep_monthly,
        } => {
            rt.block_on(commands::cleanup::cmd_cleanup(
                &cfg,
                dry_run,
                keep_daily,
                keep_weekly,
                keep_monthly,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::RetentionStats => {
            rt.block_on(commands::cleanup::cmd_retention_stats(
                &cfg, cli.output, cli.quiet,
            ));
        }
        Commands::History { database, limit } => {
            rt.block_on(commands::history::cmd_history(
                &cfg,
                database.as_deref(),
                limit,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Stats => {
            rt.block_on(commands::history::cmd_stats(&cfg, cli.output, cli.quiet));
        }
        Commands::TestConnection => {
            rt.block_on(commands::connection::cmd_test_connection(
                &cfg, cli.output, cli.quiet,
            ));
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}
