use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;

mod catalog;
mod classify;
mod config;
mod format;
mod model;
mod normalize;
mod report;
mod utils;
mod workbook;

#[derive(Debug, Parser)]
struct Cli {
    /// Run configuration file
    #[arg(long, default_value = "crossref.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Classify crawled rows by proximity tier and write the report workbook
    Classify,
    /// Drop near-duplicates and emit insertion-ready records
    Format,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Classify => report::run(&config),
        Command::Format => format::run(&config),
    }
}
