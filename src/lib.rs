//! Subscription aggregation and node benchmarking tool.

pub mod cancel;
pub mod cli;
pub mod codec;
pub mod emit;
pub mod fetch;
pub mod ingest;
pub mod node;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod score;
pub mod select;
pub mod settings;
pub mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// Run the sub_o_matic application.
pub fn run() -> Result<()> {
    let args = cli::Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).init();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move { crate::pipeline::dispatch(args).await })
}
