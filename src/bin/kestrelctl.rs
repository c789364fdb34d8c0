#[path = "kestrelctl/cli.rs"]
mod cli;
#[path = "kestrelctl/ops.rs"]
mod ops;

use clap::Parser;
use cli::{Cli, Commands};
use kestrel::config::{Config, ConfigUtils};
use kestrel::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with_file(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;
    ConfigUtils::validate_and_report(&config, "kestrelctl")?;

    match cli.command {
        Commands::Run {
            query,
            hosts,
            labels,
            export,
            filename_base,
        } => ops::run_query(&config, &query, hosts, labels, export, filename_base).await?,
        Commands::Targets { query } => ops::list_targets(&config, &query).await?,
        Commands::Validate { query } => ops::validate(&query)?,
        Commands::Config { env } => ops::show_config(&config, env)?,
    }

    Ok(())
}
