//! Lineage scenario replay.
//!
//! Reads a JSON scenario of protocol steps, applies it to an in-memory
//! royalty module with permissive collaborators, and prints a JSON report of
//! every vault, pool and external balance.

mod report;
mod scenario;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use lineage_module::RoyaltyConfig;
use tracing::{error, info};

use crate::scenario::{Runner, Scenario};

#[derive(Parser, Debug)]
#[command(name = "lineage-sim", version, about = "Replay a Lineage royalty scenario")]
struct Args {
    /// Scenario file (JSON)
    #[arg(long)]
    scenario: PathBuf,

    /// Optional config file (TOML or JSON); LINEAGE_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    if let Err(e) = run(&args) {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = RoyaltyConfig::load(args.config.as_deref()).context("loading config")?;
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&text)?;
    info!(steps = scenario.steps.len(), "sim: scenario loaded");

    let mut runner = Runner::new(config)?;
    runner.run(&scenario)?;

    let report = runner.report();
    let out = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{out}");
    Ok(())
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn args_parse_defaults() {
        let args = Args::parse_from(["lineage-sim", "--scenario", "s.json"]);
        assert_eq!(args.scenario, PathBuf::from("s.json"));
        assert_eq!(args.log_format, "text");
        assert!(args.config.is_none());
        assert!(!args.pretty);
    }

    #[test]
    fn run_from_files() {
        let mut scenario = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            scenario,
            r#"{{"steps": [
                {{"op": "register_root", "ip": "g"}},
                {{"op": "register_root", "ip": "m1"}},
                {{"op": "register_group", "group": "g"}},
                {{"op": "add_member", "group": "g", "member": "m1"}},
                {{"op": "fund", "account": "payer", "token": "usd", "amount": 10}},
                {{"op": "deposit_reward", "payer": "payer", "group": "g", "token": "usd", "amount": 10}},
                {{"op": "distribute", "group": "g", "token": "usd", "members": ["m1"]}}
            ]}}"#
        )
        .unwrap();
        let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(config, "snapshot_interval_secs = 60").unwrap();

        let args = Args {
            scenario: scenario.path().to_path_buf(),
            config: Some(config.path().to_path_buf()),
            log_level: "warn".into(),
            log_format: "text".into(),
            pretty: false,
        };
        assert!(run(&args).is_ok());
    }

    #[test]
    fn missing_scenario_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            scenario: dir.path().join("none.json"),
            config: None,
            log_level: "warn".into(),
            log_format: "text".into(),
            pretty: false,
        };
        let err = run(&args).unwrap_err();
        assert!(format!("{err:#}").contains("reading"));
    }
}
