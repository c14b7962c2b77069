use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use cli::app::{App, Commands};

mod cli;
mod config;
mod ui;

fn init_logging(level: Level) {
    // explicit filter, RUST_LOG is not consulted
    let filter = EnvFilter::new(level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let app = App::parse();
    init_logging(app.log_level());

    match app.cmd {
        Commands::Scan(arg) => cli::scan::run(arg, app.quiet),
        Commands::Convert(arg) => cli::convert::run(arg, app.quiet),
    }
}
