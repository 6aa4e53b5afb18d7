//! CLI entry point for the simulated temperature sensor.
//!
//! # Usage
//!
//! Watch samples as they arrive, with a faster period and a lower threshold:
//! ```bash
//! simtemp monitor --set period=200 --set threshold=40500
//! ```
//!
//! Dump ten samples as JSON lines:
//! ```bash
//! simtemp dump --count 10 --format json
//! ```
//!
//! Show all attributes:
//! ```bash
//! simtemp attrs
//! ```

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use simtemp_core::{
    Attribute, ConsumerPort, ControlSurface, Engine, Sample, SimtempConfig, SimtempError,
};

/// How long one readiness wait lasts before the monitor loop re-checks.
const READINESS_POLL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "simtemp")]
#[command(about = "Simulated periodic temperature sensor", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML). Environment variables prefixed with
    /// SIMTEMP_ override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print samples as they are produced until Ctrl-C
    Monitor {
        /// Stop after this many samples
        #[arg(long)]
        count: Option<u64>,

        /// Attribute write applied before sampling, e.g. --set mode=noisy
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Read a fixed number of samples and print them
    Dump {
        /// Number of samples to read
        #[arg(long, default_value_t = 10)]
        count: u64,

        /// Output format
        #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
        format: DumpFormat,

        /// Attribute write applied before sampling
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Print every control attribute
    Attrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    /// Same line format as `monitor`
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct SampleLine<'a> {
    #[serde(flatten)]
    sample: &'a Sample,
    celsius: f64,
    alert: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimtempConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SimtempConfig::load()?,
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;
    logging::init_from_config(&config.logging)?;

    match cli.command {
        Commands::Monitor { count, set } => monitor(&config, count, &set),
        Commands::Dump { count, format, set } => dump(&config, count, format, &set),
        Commands::Attrs => attrs(&config),
    }
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing attribute name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn apply_assignments(control: &ControlSurface, assignments: &[(String, String)]) -> Result<()> {
    for (key, value) in assignments {
        control
            .set_str(key, value)
            .with_context(|| format!("setting {}={}", key, value))?;
        tracing::info!(attribute = %key, value = %value.trim(), "attribute set");
    }
    Ok(())
}

/// Make Ctrl-C interrupt `reader`. The request stays pending until the next
/// blocking call observes it, so a Ctrl-C between waits is not lost.
fn interrupt_on_ctrlc(reader: &ConsumerPort) -> Result<()> {
    let reader = reader.clone();
    ctrlc::set_handler(move || reader.interrupt()).context("installing Ctrl-C handler")
}

fn format_line(sample: &Sample) -> String {
    format!(
        "{} | {:.2} °C | Threshold crossed? {}",
        Local::now().format("%H:%M:%S"),
        sample.celsius(),
        if sample.is_alert() { "YES" } else { "NO" }
    )
}

fn monitor(config: &SimtempConfig, count: Option<u64>, set: &[(String, String)]) -> Result<()> {
    let engine = Engine::start(config)?;
    apply_assignments(&engine.control(), set)?;

    let reader = engine.consumer();
    interrupt_on_ctrlc(&reader)?;

    let mut printed = 0u64;
    while count.map_or(true, |limit| printed < limit) {
        match reader.wait_readiness(READINESS_POLL) {
            Ok(ready) if !ready.is_readable() => continue,
            Ok(_) => {}
            Err(SimtempError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        }
        match reader.read(false) {
            Ok(sample) => {
                println!("{}", format_line(&sample));
                printed += 1;
            }
            Err(SimtempError::WouldBlock) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let stats = engine.stop()?;
    println!("{}", stats);
    Ok(())
}

fn dump(
    config: &SimtempConfig,
    count: u64,
    format: DumpFormat,
    set: &[(String, String)],
) -> Result<()> {
    let engine = Engine::start(config)?;
    apply_assignments(&engine.control(), set)?;

    let reader = engine.consumer();
    interrupt_on_ctrlc(&reader)?;

    read_samples(&reader, count, |sample| {
        match format {
            DumpFormat::Text => println!("{}", format_line(sample)),
            DumpFormat::Json => {
                let line = SampleLine {
                    sample,
                    celsius: sample.celsius(),
                    alert: sample.is_alert(),
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Ok(())
    })?;

    engine.stop()?;
    Ok(())
}

/// Blocking reads of up to `count` samples, handing each to `emit`. Stops
/// early when the reader is interrupted; returns the number emitted.
fn read_samples<F>(reader: &ConsumerPort, count: u64, mut emit: F) -> Result<u64>
where
    F: FnMut(&Sample) -> Result<()>,
{
    let mut emitted = 0;
    while emitted < count {
        let sample = match reader.read(true) {
            Ok(sample) => sample,
            Err(SimtempError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        };
        emit(&sample)?;
        emitted += 1;
    }
    Ok(emitted)
}

fn attrs(config: &SimtempConfig) -> Result<()> {
    let engine = Engine::start(config)?;
    let control = engine.control();
    for attr in Attribute::ALL {
        let access = if attr.is_writable() { "rw" } else { "ro" };
        println!("{:<10} {}  {}", attr.name(), access, control.get(attr));
    }
    engine.stop()?;
    Ok(())
}
