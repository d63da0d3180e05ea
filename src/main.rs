//! supply-kernel CLI entry point.
//!
//! Provides `check-config` to print the resolved configuration and
//! `simulate` to run a bootstrapped deployment forward day by day.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use supply_kernel::audit::AuditLogger;
use supply_kernel::config::{units, ProtocolConfig};
use supply_kernel::error::ErrorKind;
use supply_kernel::ledger::BalanceLedger;
use supply_kernel::logging;
use supply_kernel::modules::DebaseOutcome;
use supply_kernel::protocol::Protocol;
use supply_kernel::types::{Address, CallContext, SECONDS_PER_DAY};

/// supply-kernel: capability kernel with rate-limited minting and an
/// elastic supply index.
#[derive(Parser)]
#[command(name = "supply-kernel", version, about)]
struct Cli {
    /// Config file (defaults to `$SUPPLY_KERNEL_CONFIG` or `./supply-kernel.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Validate the configuration and print it as JSON.
    CheckConfig,
    /// Bootstrap a deployment and run one mint and one debase per day.
    Simulate {
        /// Number of simulated days.
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Whole tokens minted through the token policy each day.
        #[arg(long, default_value_t = 1_000)]
        mint_per_day: u64,
        /// Unix timestamp of the deployment (defaults to now).
        #[arg(long)]
        start: Option<i64>,
        /// Also write JSON logs to the configured logs directory.
        #[arg(long)]
        log_to_file: bool,
    },
}

/// One simulated day, printed as a JSON line.
#[derive(Serialize)]
struct DayReport {
    day: u32,
    timestamp: DateTime<Utc>,
    minted: bool,
    mint_error: Option<ErrorKind>,
    debase: Option<DebaseOutcome>,
    debase_error: Option<ErrorKind>,
    index: u128,
    total_supply: u128,
    minted_today: u128,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::CheckConfig => handle_check_config(&config),
        Command::Simulate {
            days,
            mint_per_day,
            start,
            log_to_file,
        } => handle_simulate(&config, days, mint_per_day, start, log_to_file),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ProtocolConfig> {
    let env = |key: &str| std::env::var(key).ok();
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| ProtocolConfig::config_path_with(env));
    ProtocolConfig::load_with(&path, env).context("failed to load configuration")
}

/// Validate and print the resolved configuration.
fn handle_check_config(config: &ProtocolConfig) -> anyhow::Result<()> {
    logging::init_cli(&config.kernel.log_level);
    config.validate().context("configuration is invalid")?;
    let json = serde_json::to_string_pretty(config).context("failed to render configuration")?;
    println!("{json}");
    Ok(())
}

/// Run the deployment forward `days` days.
fn handle_simulate(
    config: &ProtocolConfig,
    days: u32,
    mint_per_day: u64,
    start: Option<i64>,
    log_to_file: bool,
) -> anyhow::Result<()> {
    let _logging_guard = if log_to_file {
        Some(logging::init_production(
            &PathBuf::from(&config.paths.logs_dir),
            &config.kernel.log_level,
        )?)
    } else {
        logging::init_cli(&config.kernel.log_level);
        None
    };

    let audit = Arc::new(match &config.paths.audit_log {
        Some(path) => AuditLogger::new(path)
            .with_context(|| format!("failed to open audit log {path}"))?,
        None => AuditLogger::in_memory(),
    });

    let start = match start {
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .with_context(|| format!("start timestamp {secs} is out of range"))?,
        None => Utc::now(),
    };
    let mut protocol = Protocol::bootstrap(config, audit, start)?;

    let executor = CallContext::new(config.executor(), start);
    let minter = Address::new("simulator");
    protocol
        .token_policy
        .authorize_minter(&protocol.kernel, &executor, &minter)?;
    let recipient = Address::new(config.genesis.holder.as_str());
    let amount = units(mint_per_day, "--mint-per-day")?;

    info!(days, mint_per_day, start = %start, "simulation started");
    for day in 1..=days {
        let offset = i64::from(day)
            .checked_mul(SECONDS_PER_DAY)
            .and_then(TimeDelta::try_seconds)
            .context("simulated day offset overflows")?;
        let now = start
            .checked_add_signed(offset)
            .context("simulated time overflows")?;
        let ctx = CallContext::new(minter.clone(), now);

        let Protocol {
            kernel,
            ledger,
            mintr,
            index,
            token_policy,
            ..
        } = &mut protocol;

        let mint = token_policy.mint(kernel, mintr, ledger, &ctx, &recipient, amount);
        if let Err(e) = &mint {
            warn!(day, error = %e, "simulated mint rejected");
        }
        let debase = token_policy.debase(kernel, index, ledger, &ctx);
        if let Err(e) = &debase {
            warn!(day, error = %e, "simulated debase rejected");
        }

        let report = DayReport {
            day,
            timestamp: now,
            minted: mint.is_ok(),
            mint_error: mint.err().map(|e| e.kind()),
            debase_error: debase.as_ref().err().map(|e| e.kind()),
            debase: debase.ok(),
            index: ledger.index(),
            total_supply: ledger.total_supply(),
            minted_today: mintr.minted_today(),
        };
        println!(
            "{}",
            serde_json::to_string(&report).context("failed to render day report")?
        );
    }
    info!(
        audit_entries = protocol.kernel.audit().entries().len(),
        "simulation finished"
    );
    Ok(())
}
