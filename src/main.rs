// src/main.rs

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use git_topology::config::AnalysisConfig;
use git_topology::error::TopologyError;
use git_topology::pipeline::{self, RunReport};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid settings")?;
    Ok(config)
}

fn run(args: &Args) -> anyhow::Result<RunReport> {
    let config = load_config(args)?;
    let report = pipeline::run(&args.repo, &args.output, &config)
        .with_context(|| format!("analyzing {}", args.repo.display()))?;
    Ok(report)
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);
    let start_time = Instant::now();

    match run(&args) {
        Ok(report) => {
            if !args.quiet {
                println!(
                    "Analysis finished in {:.2?}. Found {} files, {} commits, {} hotspots, {} couplings.",
                    start_time.elapsed(),
                    report.files,
                    report.commits,
                    report.hotspots,
                    report.couplings
                );
                println!("Degraded: {}", report.degradation);
                println!("Wrote {} artifact(s) to {}", report.written.len(), args.output.display());
            }
        }
        Err(e) => {
            let stage = e.downcast_ref::<TopologyError>().map_or("setup", TopologyError::stage);
            eprintln!("git-topology failed during {stage}: {e:#}");
            process::exit(1);
        }
    }
}
