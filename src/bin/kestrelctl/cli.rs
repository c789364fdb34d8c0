use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kestrelctl")]
#[command(about = "Run live queries against an osquery fleet", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML). Defaults to config/{ENVIRONMENT}.toml when present.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a live query and stream results until the campaign finishes
    Run {
        /// SQL to run on the selected hosts
        #[arg(short, long)]
        query: String,
        /// Host id to target (may be repeated)
        #[arg(long = "host")]
        hosts: Vec<u64>,
        /// Label id to target (may be repeated)
        #[arg(long = "label")]
        labels: Vec<u64>,
        /// Write the results as CSV once the run ends
        #[arg(long)]
        export: bool,
        /// Export filename base. Overrides `campaign.export_filename_base`.
        #[arg(long = "filename-base")]
        filename_base: Option<String>,
    },
    /// Search the target catalog for hosts and labels
    Targets {
        /// Search text; empty lists everything
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Check a query against the syntax guard without running it
    Validate {
        #[arg(short, long)]
        query: String,
    },
    /// Print the effective configuration and health warnings
    Config {
        /// Print as KESTREL_* environment variables instead
        #[arg(long)]
        env: bool,
    },
}
