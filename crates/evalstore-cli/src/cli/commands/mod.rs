pub mod assess;
pub mod get;
pub mod log;

use crate::cli::args::{Cli, Command};
use evalstore_core::{StoreConfig, StoreError};
use serde_json::json;

pub mod exit_codes {
    pub const OK: i32 = 0;
    /// Invalid input, type conflict, unknown run or evaluation, corrupt tables.
    pub const DOMAIN_FAILURE: i32 = 1;
    /// Unreadable input files, config or persistence failures.
    pub const CONFIG_ERROR: i32 = 2;
}

/// Resolves the store config: YAML file or environment, then command-line flags.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut cfg = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::from_env(),
    };
    if let Some(root) = &cli.root {
        cfg.artifact_root = root.clone();
    }
    if let Some(db) = &cli.db {
        cfg.tracking_db = db.clone();
    }
    Ok(cfg)
}

pub fn dispatch(cli: Cli, cfg: &StoreConfig) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Log(args) => log::run(args, cfg),
        Command::LogTable(args) => log::run_table(args, cfg),
        Command::Assess(args) => assess::run(args, cfg),
        Command::Get(args) => get::run(args, cfg),
        Command::Runs(args) => get::runs(args, cfg),
    }
}

/// Writes a one-line JSON diagnostic to stderr and picks the exit code.
pub fn report_store_error(err: &StoreError) -> i32 {
    let diag = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    eprintln!("{}", diag);
    if err.is_domain() {
        exit_codes::DOMAIN_FAILURE
    } else {
        exit_codes::CONFIG_ERROR
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
