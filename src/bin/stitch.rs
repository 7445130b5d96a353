//! Stitch CLI Binary

use anyhow::Context;
use clap::Parser;
use stitch::logging::init_logging;
use stitch::tooling::cli::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut context = CliContext::new(cli.workspace.clone(), cli.config.clone())
        .context("Error initializing workspace")?;
    if let Some(level) = &cli.log_level {
        context.config_mut().logging.level = level.clone();
    }
    init_logging(Some(&context.config().logging)).context("Error initializing logging")?;

    let output = context.execute(&cli.command)?;
    println!("{}", output);
    Ok(())
}
