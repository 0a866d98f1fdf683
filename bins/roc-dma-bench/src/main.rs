//! roc-dma-bench - readout card DMA throughput and data integrity benchmark
//!
//! # Usage
//!
//! ```bash
//! # 1500 pages from channel 0 of card 12345
//! roc-dma-bench --id=12345 --channel=0
//!
//! # Run against the software emulator until Ctrl+C, with live status
//! roc-dma-bench --id=emu-cru --channel=0 --pages=0 -v
//! ```

mod cli;
mod signals;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use roc_bench_core::DmaBench;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.to_config()?;
    let console_error_chars = config.limits.console_error_chars;
    let bench = DmaBench::new(config)?;

    let interrupt = signals::install()?;
    let report = bench
        .execute(&interrupt)
        .with_context(|| format!("DMA benchmark on card {} channel {} failed", cli.card_id, cli.channel))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report.summary())
            .context("failed to serialize report")?;
        println!("{json}");
        return Ok(());
    }

    if cli.verbose {
        if let Some(errors) = report.console_errors(console_error_chars) {
            print!("\n{errors}");
        }
    }
    print!("{}", report.render_stats());
    Ok(())
}
