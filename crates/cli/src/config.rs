//! Config profile loading.
//!
//! One immutable `Config` is loaded in `main` from `dbkeep.toml` plus
//! `DBKEEP_*` environment overrides and passed into each command; nothing
//! below the CLI layer reads ambient state.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use time::Duration;

use dbkeep_adapters::ConnectionProfile;
use dbkeep_core::{DatabaseKind, RetentionPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One database dbkeep manages, with its connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseTarget {
    pub kind: DatabaseKind,
    /// Logical database name; also the default restore target.
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl DatabaseTarget {
    pub fn profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.name.clone(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
    pub stale_pending_hours: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        RetentionSettings {
            keep_daily: 7,
            keep_weekly: 4,
            keep_monthly: 12,
            stale_pending_hours: 24,
        }
    }
}

impl RetentionSettings {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_daily: self.keep_daily,
            keep_weekly: self.keep_weekly,
            keep_monthly: self.keep_monthly,
            stale_pending_after: Duration::hours(self.stale_pending_hours),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup_dir: PathBuf,
    /// Catalog file location; defaults to `<backup_dir>/catalog.json`.
    pub catalog: Option<PathBuf>,
    #[serde(rename = "database")]
    pub databases: Vec<DatabaseTarget>,
    pub retention: RetentionSettings,
    pub slack: SlackSettings,
    pub dump_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backup_dir: PathBuf::from("backups"),
            catalog: None,
            databases: Vec::new(),
            retention: RetentionSettings::default(),
            slack: SlackSettings::default(),
            dump_timeout_secs: 3600,
        }
    }
}

impl Config {
    /// Load from the given path, `$DBKEEP_CONFIG`, or `./dbkeep.toml`,
    /// in that order. A missing file yields the defaults; `DBKEEP_*`
    /// environment variables are applied on top either way.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("DBKEEP_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("dbkeep.toml"));
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(dir) = env::var_os("DBKEEP_BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("DBKEEP_SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(url);
        }
        if let Ok(enabled) = env::var("DBKEEP_SLACK_ENABLED") {
            self.slack.enabled = enabled.eq_ignore_ascii_case("true");
        }
        // DBKEEP_DB_* describe one database; they replace the first
        // configured target (or become the only one).
        let kind = env::var("DBKEEP_DB_TYPE")
            .ok()
            .and_then(|v| v.parse::<DatabaseKind>().ok());
        let name = env::var("DBKEEP_DB_NAME").ok();
        if let (Some(kind), Some(name)) = (kind, name) {
            let target = DatabaseTarget {
                kind,
                name,
                host: env::var("DBKEEP_DB_HOST").unwrap_or_else(|_| default_host()),
                port: env::var("DBKEEP_DB_PORT").ok().and_then(|p| p.parse().ok()),
                user: env::var("DBKEEP_DB_USER").unwrap_or_default(),
                password: env::var("DBKEEP_DB_PASSWORD").unwrap_or_default(),
            };
            if self.databases.is_empty() {
                self.databases.push(target);
            } else {
                self.databases[0] = target;
            }
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| self.backup_dir.join("catalog.json"))
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.retention.policy()
    }

    pub fn dump_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dump_timeout_secs)
    }

    /// The named target, or the first configured one.
    pub fn target(&self, name: Option<&str>) -> Option<&DatabaseTarget> {
        match name {
            Some(name) => self.databases.iter().find(|t| t.name == name),
            None => self.databases.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_profile() {
        let cfg: Config = toml::from_str(
            r#"
            backup_dir = "/var/backups"
            dump_timeout_secs = 600

            [[database]]
            kind = "postgres"
            name = "orders"
            host = "db.internal"
            port = 5433
            user = "app"
            password = "secret"

            [[database]]
            kind = "mongodb"
            name = "events"

            [retention]
            keep_daily = 3
            keep_weekly = 2
            keep_monthly = 1

            [slack]
            enabled = true
            webhook_url = "https://hooks.slack.example/T000"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.backup_dir, PathBuf::from("/var/backups"));
        assert_eq!(cfg.databases.len(), 2);
        assert_eq!(cfg.databases[0].kind, DatabaseKind::Postgres);
        assert_eq!(cfg.databases[0].port, Some(5433));
        assert_eq!(cfg.databases[1].host, "localhost");
        assert_eq!(cfg.retention.keep_daily, 3);
        assert!(cfg.slack.enabled);
        assert_eq!(cfg.dump_timeout().as_secs(), 600);
        assert_eq!(cfg.catalog_path(), PathBuf::from("/var/backups/catalog.json"));
    }

    #[test]
    fn defaults_when_sections_missing() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.backup_dir, PathBuf::from("backups"));
        assert_eq!(cfg.retention.keep_daily, 7);
        assert_eq!(cfg.retention.stale_pending_hours, 24);
        assert!(!cfg.slack.enabled);
        assert!(cfg.target(None).is_none());
    }

    #[test]
    fn target_lookup_by_name() {
        let cfg: Config = toml::from_str(
            r#"
            [[database]]
            kind = "mysql"
            name = "orders"

            [[database]]
            kind = "mysql"
            name = "users"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.target(Some("users")).unwrap().name, "users");
        assert_eq!(cfg.target(None).unwrap().name, "orders");
        assert!(cfg.target(Some("nope")).is_none());
    }
}
