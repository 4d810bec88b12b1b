//! `test-connection`.

use std::process;

use serde_json::json;

use dbkeep_adapters::adapter_for;

use crate::config::Config;
use crate::{report_error, OutputFormat};

pub(crate) async fn cmd_test_connection(cfg: &Config, output: OutputFormat, quiet: bool) {
    if cfg.databases.is_empty() {
        report_error("no databases configured", output, quiet);
        process::exit(2);
    }

    let mut results: Vec<(String, Result<(), String>)> = Vec::new();
    for target in &cfg.databases {
        let adapter = adapter_for(target.kind, target.profile());
        let result = adapter
            .test_connection()
            .await
            .map_err(|e| e.to_string());
        results.push((target.name.clone(), result));
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if !quiet {
        match output {
            OutputFormat::Text => {
                for (name, result) in &results {
                    match result {
                        Ok(()) => println!("{name}: ok"),
                        Err(msg) => println!("{name}: FAILED ({msg})"),
                    }
                }
            }
            OutputFormat::Json => {
                let entries: Vec<_> = results
                    .iter()
                    .map(|(name, result)| match result {
                        Ok(()) => json!({ "database": name, "ok": true }),
                        Err(msg) => json!({ "database": name, "ok": false, "error": msg }),
                    })
                    .collect();
                println!("{}", json!({ "results": entries }));
            }
        }
    }
    if failed > 0 {
        process::exit(1);
    }
}
