use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;

mod cli;
mod core;
mod helpers;
mod list;

use crate::{cli::Cli, helpers::logger::Logger, list::Lister};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        x => bail!("Invalid log_level: {}", x),
    };
    Logger::init(log_level)?;

    // The listing can be large, keep stdout buffered until we're done.
    let mut out = io::BufWriter::new(io::stdout());
    Lister::new(cli.list_config()).run(&mut out)?;
    out.flush()?;
    Ok(())
}
