//! Database adapters.
//!
//! One adapter per supported engine, each shelling out to that engine's
//! own dump and restore tools (`pg_dump`/`pg_restore`, `mysqldump`/`mysql`,
//! `mongodump`/`mongorestore`). The rest of dbkeep depends only on the
//! `DatabaseAdapter` trait, never on a concrete adapter.

pub mod checksum;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
mod process;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use dbkeep_core::{BackupScope, DatabaseKind};

pub use mongodb::MongodbAdapter;
pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;

/// Connection parameters for one database, passed in explicitly at
/// construction. Adapters never read ambient environment state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// A dump to perform.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub output_path: PathBuf,
    pub scope: BackupScope,
    pub timeout: Duration,
}

/// What a finished dump produced. Checksum is hex SHA-256 of the
/// artifact, computed by streaming the finished file.
#[derive(Debug, Clone)]
pub struct DumpArtifact {
    pub artifact_path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub scope: BackupScope,
}

/// A restore to perform. `objects` limits the restore to named
/// tables/collections; empty means everything.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub backup_path: PathBuf,
    /// Restore into a different database than the profile's, if set.
    pub target_database: Option<String>,
    pub objects: Vec<String>,
    pub timeout: Duration,
}

/// Result of a structural listing of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectListing {
    /// Names of the tables/collections the artifact contains.
    Objects(Vec<String>),
    /// The format does not support listing without a restore.
    Unsupported,
}

/// Expected leading bytes for an engine's dump format. An artifact
/// matches if it starts with any accepted prefix.
#[derive(Debug, Clone, Copy)]
pub struct HeaderSignature {
    pub description: &'static str,
    pub accepted: &'static [&'static [u8]],
}

impl HeaderSignature {
    pub fn matches(&self, leading: &[u8]) -> bool {
        self.accepted
            .iter()
            .any(|magic| leading.len() >= magic.len() && leading.starts_with(magic))
    }

    /// Longest accepted prefix; verification reads at least this many bytes.
    pub fn max_len(&self) -> usize {
        self.accepted.iter().map(|m| m.len()).max().unwrap_or(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{tool} not found; is the {kind} client installed?")]
    ToolMissing { tool: String, kind: DatabaseKind },

    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    #[error("{tool} timed out after {}s", timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("unsupported for {kind}: {reason}")]
    Unsupported { kind: DatabaseKind, reason: String },

    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The capability set the core depends on per engine: dump, restore,
/// structural listing, and format header metadata.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Leading-byte signature of this engine's dump format, consumed by
    /// the verification engine's header check.
    fn header_signature(&self) -> HeaderSignature;

    /// Cheap connectivity probe, run before long dumps.
    async fn test_connection(&self) -> Result<(), AdapterError>;

    async fn dump(&self, req: &DumpRequest) -> Result<DumpArtifact, AdapterError>;

    async fn restore(&self, req: &RestoreRequest) -> Result<(), AdapterError>;

    /// Enumerate contained tables/collections without extracting data.
    async fn list_objects(&self, artifact: &Path) -> Result<ObjectListing, AdapterError>;
}

/// Construct the adapter for a database kind.
pub fn adapter_for(
    kind: DatabaseKind,
    profile: ConnectionProfile,
) -> Box<dyn DatabaseAdapter> {
    match kind {
        DatabaseKind::Postgres => Box::new(PostgresAdapter::new(profile)),
        DatabaseKind::Mysql => Box::new(MysqlAdapter::new(profile)),
        DatabaseKind::Mongodb => Box::new(MongodbAdapter::new(profile)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_signature_prefix_match() {
        let sig = HeaderSignature {
            description: "PostgreSQL custom-format dump",
            accepted: &[b"PGDMP"],
        };
        assert!(sig.matches(b"PGDMP\x01\x0e"));
        assert!(!sig.matches(b"PGDM"));
        assert!(!sig.matches(b"-- SQL"));
        assert_eq!(sig.max_len(), 5);
    }

    #[test]
    fn header_signature_any_accepted_prefix() {
        let sig = HeaderSignature {
            description: "gzip or raw archive",
            accepted: &[&[0x1f, 0x8b], &[0x6d, 0xe2, 0x99, 0x81]],
        };
        assert!(sig.matches(&[0x1f, 0x8b, 0x00]));
        assert!(sig.matches(&[0x6d, 0xe2, 0x99, 0x81, 0xff]));
        assert!(!sig.matches(&[0x00, 0x00]));
        assert_eq!(sig.max_len(), 4);
    }
}
