use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line options
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Full run: select, fetch, validate, score, emit
    Run {
        /// Subscription list file, one URL per line
        #[arg(long, default_value = "subscriptions.txt")]
        subscriptions: PathBuf,

        /// State directory
        #[arg(long = "data-dir", default_value = "data")]
        data_dir: PathBuf,

        /// Artifact directory
        #[arg(long = "output-dir", default_value = "output")]
        output_dir: PathBuf,

        /// Cancel the run after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Register subscription URLs without fetching
    Init {
        /// Subscription list file, one URL per line
        #[arg(long, default_value = "subscriptions.txt")]
        subscriptions: PathBuf,

        /// State directory
        #[arg(long = "data-dir", default_value = "data")]
        data_dir: PathBuf,
    },
    /// Print the subscription scoreboard
    Report {
        /// State directory
        #[arg(long = "data-dir", default_value = "data")]
        data_dir: PathBuf,
    },
}
