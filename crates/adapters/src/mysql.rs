//! MySQL adapter: `mysqldump` plain-SQL dumps, restores by piping the
//! dump back through `mysql`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use dbkeep_core::{BackupScope, DatabaseKind};

use crate::checksum::sha256_file;
use crate::process::run_tool;
use crate::{
    AdapterError, ConnectionProfile, DatabaseAdapter, DumpArtifact, DumpRequest,
    HeaderSignature, ObjectListing, RestoreRequest,
};

const DEFAULT_PORT: u16 = 3306;

/// Plain-SQL dumps open with a `-- MySQL dump` comment prelude; a
/// compressed dump is a gzip stream.
const SIGNATURE: HeaderSignature = HeaderSignature {
    description: "mysqldump SQL text or gzip stream",
    accepted: &[b"-- ", &[0x1f, 0x8b]],
};

pub struct MysqlAdapter {
    profile: ConnectionProfile,
}

impl MysqlAdapter {
    pub fn new(profile: ConnectionProfile) -> Self {
        MysqlAdapter { profile }
    }

    /// Password travels via `MYSQL_PWD` in the child environment, never
    /// argv, so it cannot leak through the process table.
    fn tool(&self, name: &str) -> Command {
        let mut cmd = Command::new(name);
        cmd.arg(format!("--host={}", self.profile.host))
            .arg(format!(
                "--port={}",
                self.profile.port.unwrap_or(DEFAULT_PORT)
            ))
            .arg(format!("--user={}", self.profile.user))
            .arg("--protocol=TCP")
            .env("MYSQL_PWD", &self.profile.password);
        cmd
    }
}

#[async_trait]
impl DatabaseAdapter for MysqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Mysql
    }

    fn header_signature(&self) -> HeaderSignature {
        SIGNATURE
    }

    async fn test_connection(&self) -> Result<(), AdapterError> {
        let mut cmd = self.tool("mysqladmin");
        cmd.arg("ping");
        run_tool(cmd, "mysqladmin", self.kind(), Duration::from_secs(10)).await?;
        Ok(())
    }

    async fn dump(&self, req: &DumpRequest) -> Result<DumpArtifact, AdapterError> {
        let mut cmd = self.tool("mysqldump");
        cmd.arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg("--events")
            .arg(format!("--result-file={}", req.output_path.display()))
            .arg(&self.profile.database);
        if let BackupScope::Partial(tables) = &req.scope {
            for table in tables {
                cmd.arg(table);
            }
        }
        run_tool(cmd, "mysqldump", self.kind(), req.timeout).await?;

        let (checksum, size_bytes) = sha256_file(&req.output_path).await?;
        Ok(DumpArtifact {
            artifact_path: req.output_path.clone(),
            size_bytes,
            checksum,
            scope: req.scope.clone(),
        })
    }

    async fn restore(&self, req: &RestoreRequest) -> Result<(), AdapterError> {
        if !req.objects.is_empty() {
            return Err(AdapterError::Unsupported {
                kind: self.kind(),
                reason: "selective restore from a plain-SQL dump".to_string(),
            });
        }
        let target = req
            .target_database
            .as_deref()
            .unwrap_or(&self.profile.database);
        let dump = std::fs::File::open(&req.backup_path)?;
        let mut cmd = self.tool("mysql");
        cmd.arg(target).stdin(Stdio::from(dump));
        run_tool(cmd, "mysql", self.kind(), req.timeout).await?;
        Ok(())
    }

    async fn list_objects(&self, _artifact: &Path) -> Result<ObjectListing, AdapterError> {
        // A plain-SQL dump has no table of contents to read without
        // parsing the whole file.
        Ok(ObjectListing::Unsupported)
    }
}
