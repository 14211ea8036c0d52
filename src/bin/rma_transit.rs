// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host entry point driving an RMA transition against the simulated device.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Host entry point driving an RMA transition against the simulated device.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use rma_transit::config::{TransitConfig, DEFAULT_CONFIG_PATH};
use rma_transit::sim::SimClock;
use rma_transit::{
    Delay, DiagnosticSink, LifecycleStageReader, MailboxTransport, TransitionOrchestrator,
};

/// RMA lifecycle transition command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Transition a device to the RMA lifecycle stage", long_about = None)]
struct Cli {
    /// Path to the transition configuration TOML.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override mailbox.timeout_secs.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Treat the operator as having confirmed; run one attempt and exit.
    #[arg(long)]
    confirm: bool,

    /// Sleep for real between mailbox polls instead of advancing simulated time only.
    #[arg(long)]
    realtime: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

struct Console;

impl DiagnosticSink for Console {
    fn line(&mut self, message: &str) {
        println!("\r\n{message}\r");
    }
}

/// Simulated clock that optionally waits out each interval on the host.
struct PacedClock<'a> {
    clock: SimClock<'a>,
    realtime: bool,
}

impl Delay for PacedClock<'_> {
    fn delay(&mut self, interval: Duration) {
        if self.realtime {
            thread::sleep(interval);
        }
        self.clock.delay(interval);
    }
}

fn wait_for_confirmation(input: &mut impl BufRead) -> Result<bool> {
    print!("\r\nType 'rma' and press Enter to transition the device to RMA: ");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    let read = input.read_line(&mut line).context("read confirmation")?;
    Ok(read > 0 && line.trim().eq_ignore_ascii_case("rma"))
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = TransitConfig::load(&cli.config)
        .with_context(|| format!("load configuration {}", cli.config.display()))?;
    if let Some(secs) = cli.timeout_secs {
        config.mailbox.timeout = Duration::from_secs(secs);
    }

    let device = config.simulation.device();
    let transport = MailboxTransport::new(
        device.mailbox(),
        PacedClock {
            clock: device.clock(),
            realtime: cli.realtime,
        },
    )
    .with_poll_interval(config.mailbox.poll_interval);
    let mut orchestrator = TransitionOrchestrator::new(
        LifecycleStageReader::new(device.efuse()),
        transport,
        &config.credential,
    )
    .with_timeout(config.mailbox.timeout);

    let mut console = Console;
    println!("\r\n***** TransitionToRMA ***** \r");
    orchestrator.announce(&mut console);

    let triggered = if cli.confirm {
        true
    } else {
        let stdin = io::stdin();
        wait_for_confirmation(&mut stdin.lock())?
    };
    let Some(report) = orchestrator.on_trigger(triggered, &mut console) else {
        console.line("Transition not confirmed; device unchanged");
        return Ok(false);
    };

    if report.is_success() || report.is_unconfirmed() {
        device.reset();
        console.line("Device reset");
        orchestrator.report_stage(&mut console);
    }
    Ok(report.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("rma-transit: {err:#}");
            ExitCode::from(2)
        }
    }
}
