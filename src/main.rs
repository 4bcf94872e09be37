use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use heaper::config::ConfigBuilder;
use heaper::{ConfigManager, Mode, Session};
use heaper::trace::write_trace;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Table rendition to run
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// File revealed by the hidden handler
    #[arg(short, long)]
    secret: Option<PathBuf>,

    /// Longest accepted name in hardened mode
    #[arg(short, long)]
    name_limit: Option<usize>,

    /// Write the session trace to this file on exit
    #[arg(short, long)]
    trace: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let base = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Default::default(),
    };

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(mode) = args.mode {
        builder = builder.mode(mode);
    }
    if let Some(secret) = args.secret {
        builder = builder.secret_path(secret);
    }
    if let Some(limit) = args.name_limit {
        builder = builder.name_limit(limit);
    }
    if let Some(trace) = args.trace {
        builder = builder.trace_path(trace);
    }
    let config = builder.build()?;
    info!("running in {:?} mode", config.mode);

    let stdin = io::stdin();
    let mut session = Session::from_config(&config, stdin.lock(), io::stdout());
    let end = session.run()?;

    let trace = session.into_trace();
    if let Some(path) = &config.trace_path {
        write_trace(&trace, path)?;
        info!("trace written to {}", path.display());
    }

    process::exit(end.exit_code());
}
