use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

use super::convert::ConvertArg;
use super::scan::ScanArg;

#[derive(Clone, Debug, Parser)]
#[command(name = "flatline", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Inventory the XML documents inside an archive
    #[command(alias = "s", name = "scan")]
    Scan(ScanArg),
    /// Scan an archive and convert every document to CSV/TSV
    #[command(alias = "c", name = "convert")]
    Convert(ConvertArg),
}

/// Options shared by every subcommand.
#[derive(Args, Clone, Debug)]
pub struct CommonArg {
    /// Archive (.zip) or standalone XML document
    pub input: PathBuf,

    /// TOML settings file with [scan], [classify], [flatten] and [convert] sections
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl App {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
