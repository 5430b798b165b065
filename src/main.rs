mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use role_monitor::{clienv, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_file = cli.log_file.clone().unwrap_or_else(clienv::log_path);
    logging::init(&log_file, "info");

    let ctx = commands::Context::from_cli(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::cmd_run(ctx).await?,
        Commands::Check => commands::run::cmd_check(ctx).await?,
        Commands::Status => commands::status::cmd_status(&ctx)?,
    }

    Ok(())
}
