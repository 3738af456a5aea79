#![doc = include_str!("../README.md")]

mod command;
mod config;
mod telemetry;

use std::io::{BufWriter, Write};

use clap::Parser;
use config::{CliArgs, Config};
use telemetry::init_tracing;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_tracing();

    let config = Config::try_from(args)?;
    if cfg!(debug_assertions) {
        tracing::debug!("Starting with full config: {:#?}", config);
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    command::run(&config, &mut out)?;
    out.flush()?;
    Ok(())
}
