//! PiClaim CLI
//!
//! Claims Pi claimable balances as soon as they appear and forwards the
//! funds to a fixed destination, with a separate sponsor account paying fees.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use piclaim_daemon::{
    ClaimKeys, ClaimService, CycleAbort, CycleReport, Outcome, SchedulePolicy, Scheduler,
};
use piclaim_settings::Settings;

/// PiClaim - sponsored claimable balance sweeper
#[derive(Parser)]
#[command(name = "piclaim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the claim loop until interrupted
    Run,

    /// Run a single cycle and print what happened
    Once,

    /// Print the claimant and sponsor addresses
    Addresses,

    /// List balances currently claimable by the claimant
    Balances,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    piclaim_logging::init(cli.verbose);

    // Missing or malformed configuration stops us before any cycle
    let settings = Settings::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run => run(&settings).await?,
        Commands::Once => once(&settings).await?,
        Commands::Addresses => addresses(&settings)?,
        Commands::Balances => balances(&settings).await?,
    }

    Ok(())
}

async fn run(settings: &Settings) -> Result<()> {
    let mut service = ClaimService::from_settings(settings).context("Failed to start claim service")?;
    let scheduler = Scheduler::new(SchedulePolicy::from_settings(&settings.policy));

    info!("Starting PiClaim {}", env!("CARGO_PKG_VERSION"));
    service
        .run(scheduler, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await;

    Ok(())
}

async fn once(settings: &Settings) -> Result<()> {
    let mut service = ClaimService::from_settings(settings).context("Failed to start claim service")?;
    let report = service.run_cycle().await;
    service.flush_notifications().await;
    print_report(&report);
    Ok(())
}

fn addresses(settings: &Settings) -> Result<()> {
    let keys = ClaimKeys::derive(&settings.claimant_phrase, &settings.sponsor_phrase)?;

    println!("Claimant:    {}", keys.claimant.address());
    println!("Sponsor:     {}", keys.sponsor.address());
    println!("Destination: {}", settings.destination);
    Ok(())
}

async fn balances(settings: &Settings) -> Result<()> {
    let service = ClaimService::from_settings(settings).context("Failed to start claim service")?;
    let balances = service.scan().await.context("Failed to query claimable balances")?;

    if balances.is_empty() {
        println!("No claimable balances for {}", service.keys().claimant.address());
        return Ok(());
    }

    println!("{:<72}  {:>20}", "BALANCE", "AMOUNT (Pi)");
    for balance in balances {
        println!("{:<72}  {:>20}", balance.id, balance.amount);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("Cycle {}: {} balance(s) found", report.cycle, report.found);

    for balance in &report.balances {
        let status = match &balance.outcome {
            Outcome::Success { hash } => format!("claimed in {}", hash),
            Outcome::Rejected { codes } => format!("rejected: {}", codes),
            Outcome::RateLimited { .. } => "rate limited".to_string(),
            Outcome::TransientFailure { cause } => format!("failed: {}", cause),
            Outcome::Skipped { reason } => format!("skipped: {}", reason),
        };
        println!("  {}  {:>14} Pi  {}", balance.balance_id.short(), balance.amount, status);
    }

    match &report.abort {
        Some(CycleAbort::Scan { cause }) => println!("Scan failed: {}", cause),
        Some(CycleAbort::FeeFetch { cause }) => println!("Aborted, base fee unavailable: {}", cause),
        Some(CycleAbort::RateLimited { retry_after }) => match retry_after {
            Some(delay) => println!("Aborted, rate limited (retry after {}s)", delay.as_secs()),
            None => println!("Aborted, rate limited"),
        },
        None => {}
    }
}
