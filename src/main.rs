mod cli;
mod fetch;

use clap::Parser;
use cli::{Cli, Commands};
use mediabox::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mediabox::observability::init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Server(args) => mediabox::api::run(config, args.address).await?,
        Commands::Fetch(args) => fetch::run(config, args).await?,
    }

    Ok(())
}
