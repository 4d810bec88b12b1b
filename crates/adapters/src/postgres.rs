//! PostgreSQL adapter: `pg_dump` custom-format dumps, `pg_restore`
//! restores, and `pg_restore --list` for structural listing.

use std::path::Path;
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

const DEFAULT_PORT: u16 = 5432;

/// Custom-format dumps open with this fixed signature.
const SIGNATURE: HeaderSignature = HeaderSignature {
    description: "PostgreSQL custom-format dump (PGDMP)",
    accepted: &[b"PGDMP"],
};

pub struct PostgresAdapter {
    profile: ConnectionProfile,
}

impl PostgresAdapter {
    pub fn new(profile: ConnectionProfile) -> Self {
        PostgresAdapter { profile }
    }

    /// Connection args shared by every tool invocation. The password goes
    /// through `PGPASSWORD` in the child environment, never argv.
    fn tool(&self, name: &str) -> Command {
        let mut cmd = Command::new(name);
        cmd.arg(format!("--host={}", self.profile.host))
            .arg(format!(
                "--port={}",
                self.profile.port.unwrap_or(DEFAULT_PORT)
            ))
            .arg(format!("--username={}", self.profile.user))
            .env("PGPASSWORD", &self.profile.password);
        cmd
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn header_signature(&self) -> HeaderSignature {
        SIGNATURE
    }

    async fn test_connection(&self) -> Result<(), AdapterError> {
        let mut cmd = self.tool("pg_isready");
        cmd.arg(format!("--dbname={}", self.profile.database));
        run_tool(cmd, "pg_isready", self.kind(), Duration::from_secs(10)).await?;
        Ok(())
    }

    async fn dump(&self, req: &DumpRequest) -> Result<DumpArtifact, AdapterError> {
        let mut cmd = self.tool("pg_dump");
        cmd.arg(format!("--dbname={}", self.profile.database))
            .arg(format!("--file={}", req.output_path.display()))
            .arg("--format=custom")
            .arg("--no-password");
        if let BackupScope::Partial(tables) = &req.scope {
            for table in tables {
                cmd.arg("--table").arg(table);
            }
        }
        run_tool(cmd, "pg_dump", self.kind(), req.timeout).await?;

        let (checksum, size_bytes) = sha256_file(&req.output_path).await?;
        Ok(DumpArtifact {
            artifact_path: req.output_path.clone(),
            size_bytes,
            checksum,
            scope: req.scope.clone(),
        })
    }

    async fn restore(&self, req: &RestoreRequest) -> Result<(), AdapterError> {
        let target = req
            .target_database
            .as_deref()
            .unwrap_or(&self.profile.database);
        let mut cmd = self.tool("pg_restore");
        cmd.arg(format!("--dbname={target}"))
            .arg("--clean")
            .arg("--if-exists")
            .arg("--no-password");
        for table in &req.objects {
            cmd.arg("--table").arg(table);
        }
        cmd.arg(&req.backup_path);
        run_tool(cmd, "pg_restore", self.kind(), req.timeout).await?;
        Ok(())
    }

    async fn list_objects(&self, artifact: &Path) -> Result<ObjectListing, AdapterError> {
        let mut cmd = Command::new("pg_restore");
        cmd.arg("--list").arg(artifact);
        let output = run_tool(cmd, "pg_restore", self.kind(), Duration::from_secs(30)).await?;
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(ObjectListing::Objects(parse_table_data(&listing)))
    }
}

/// Pull table names out of `pg_restore --list` output. Data entries look
/// like `123; 0 16384 TABLE DATA public orders postgres`.
fn parse_table_data(listing: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for line in listing.lines() {
        if !line.contains("TABLE DATA") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let Some(i) = parts.iter().position(|p| *p == "public") {
            if let Some(name) = parts.get(i + 1) {
                let name = name.to_string();
                if !tables.contains(&name) {
                    tables.push(name);
                }
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_data_entries() {
        let listing = "\
;\n\
; Archive created at 2026-01-10 03:00:00 UTC\n\
217; 1259 16385 TABLE public orders app\n\
3501; 0 16385 TABLE DATA public orders app\n\
3502; 0 16390 TABLE DATA public customers app\n\
3502; 0 16390 TABLE DATA public customers app\n\
4000; 0 0 SEQUENCE SET public orders_id_seq app\n";
        assert_eq!(parse_table_data(listing), vec!["orders", "customers"]);
    }

    #[test]
    fn empty_listing_has_no_tables() {
        assert!(parse_table_data("; nothing here\n").is_empty());
    }
}
