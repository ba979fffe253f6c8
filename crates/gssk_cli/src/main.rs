//! GSSK Run - integrates a flow-network model and writes its trajectory as CSV.
//!
//! Output goes to stdout unless `-o` is given. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `gssk=info`).

mod csv;

use anyhow::{Context, Result};
use clap::Parser;
use csv::CsvRecorder;
use gssk_core::{IntegrationMethod, Simulation};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gssk")]
#[command(about = "Simulate a GSSK flow-network model and write the trajectory as CSV")]
struct Cli {
    /// Path to the model JSON document
    model: PathBuf,

    /// Output CSV path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the integration method (rk4, euler, tsit5)
    #[arg(long)]
    method: Option<String>,

    /// Clamp node values below zero back to zero after every step
    #[arg(long)]
    clamp_negative: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gssk=info,gssk_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("Loading model from: {}", cli.model.display());
    let json = fs::read_to_string(&cli.model)
        .with_context(|| format!("failed to read {}", cli.model.display()))?;
    let (model, mut config) = gssk_core::load(&json)
        .with_context(|| format!("failed to load {}", cli.model.display()))?;

    if let Some(name) = &cli.method {
        config = config.with_method(name.parse::<IntegrationMethod>()?);
    }
    if cli.clamp_negative {
        config = config.with_clamp_negative(true);
    }

    let out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut recorder = CsvRecorder::new(BufWriter::new(out), &model.node_ids())
        .context("failed to write CSV header")?;

    let mut simulation = Simulation::new(model, config);
    let outcome = simulation.run_with(&mut recorder, None);
    let rows = recorder.rows();
    recorder.finish().context("failed to write CSV output")?;

    match outcome {
        Ok(_) => {
            info!("Wrote {} samples up to t={}", rows, simulation.time());
            Ok(())
        }
        Err(failure) => Err(anyhow::Error::new(failure)
            .context(format!("run halted; {} samples before the failure were written", rows))),
    }
}
