//! One full run: select, fetch, ingest, validate, score, persist, emit.
//!
//! Exit discipline: soft failures (bad URIs, dead subscriptions, probe
//! timeouts) are counted and scored, never fatal. A run fails only when the
//! subscription list cannot be read, persistence fails, or the run is
//! cancelled — and a cancelled run leaves no store writes behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info, warn};

use crate::cancel::{cancel_pair, CancelSource, CancelToken};
use crate::cli::{Cli, Commands};
use crate::emit::{self, ClashWriter};
use crate::fetch::Fetcher;
use crate::ingest;
use crate::probe;
use crate::report;
use crate::score;
use crate::select;
use crate::settings::Settings;
use crate::store::{HistoryEntry, Store};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("subscription list {0}: {1}")]
    SubscriptionList(PathBuf, std::io::Error),
    #[error("run cancelled")]
    Cancelled,
}

pub async fn dispatch(args: Cli) -> anyhow::Result<()> {
    match args.command {
        Commands::Run {
            subscriptions,
            data_dir,
            output_dir,
            deadline,
        } => run(&subscriptions, &data_dir, &output_dir, deadline).await,
        Commands::Init {
            subscriptions,
            data_dir,
        } => init(&subscriptions, &data_dir),
        Commands::Report { data_dir } => {
            let store = Store::open(&data_dir);
            println!("{}", report::scoreboard(&store.subscriptions()));
            Ok(())
        }
    }
}

/// Read the subscription list: one URL per line, `#` comments and blank
/// lines ignored. A missing or unreadable file is run-fatal.
fn read_subscription_list(path: &Path) -> Result<Vec<String>, RunError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| RunError::SubscriptionList(path.to_path_buf(), e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn arm_cancellation(source: CancelSource, deadline: Option<u64>) {
    let ctrl_c_source = source.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            ctrl_c_source.cancel();
        }
    });
    if let Some(secs) = deadline {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("run deadline of {secs}s reached, cancelling");
            source.cancel();
        });
    }
}

async fn run(
    subscriptions: &Path,
    data_dir: &Path,
    output_dir: &Path,
    deadline: Option<u64>,
) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let urls = read_subscription_list(subscriptions)?;
    info!("{} subscription urls on the list", urls.len());

    let mut store = Store::open(data_dir);
    store.prune_absent(&urls);
    let run_number = store.begin_run();
    let states = store.upsert_subscriptions(&urls);

    let (cancel_src, cancel) = cancel_pair();
    arm_cancellation(cancel_src, deadline);

    let selected = select::select(&states, run_number, select::default_seed());
    info!(
        "run {}: selected {}/{} subscriptions",
        run_number,
        selected.len(),
        states.len()
    );

    let fetcher = Fetcher::new(&settings)?;
    let selected_urls: Vec<String> = selected.iter().map(|s| s.url.clone()).collect();
    let fetched = fetcher.fetch_all(&selected_urls, &cancel).await;
    bail_if_cancelled(&cancel)?;

    let ingested = ingest::ingest(&fetched);
    let parsed_total = ingested.nodes.len();
    info!("{} unique nodes after dedup", parsed_total);

    let validated = probe::validate(ingested.nodes, &settings, &cancel).await;
    if validated.report.cancelled {
        return Err(RunError::Cancelled.into());
    }
    bail_if_cancelled(&cancel)?;

    // scoring effects, applied to the store exactly once, then persisted
    let mut scored = Vec::with_capacity(selected.len());
    for mut state in selected {
        let fetch_ok = fetched
            .iter()
            .find(|f| f.url == state.url)
            .map(|f| f.ok())
            .unwrap_or(false);
        let stat = validated.report.per_subscription.get(&state.url);
        state.push_history(HistoryEntry {
            timestamp: chrono::Utc::now().timestamp(),
            total_nodes: stat.map(|s| s.total).unwrap_or(0),
            valid_nodes: stat.map(|s| s.valid).unwrap_or(0),
            avg_latency_ms: stat.map(|s| s.avg_latency_ms).unwrap_or(0.0),
            fetch_ok,
        });
        if fetch_ok {
            state.success_count += 1;
        }
        state.score = score::compute_score(&state.history, &settings);
        state.tier = score::tier_of(state.score);
        scored.push(state);
    }
    for state in &scored {
        store.apply(state.clone());
    }
    store.persist().context("store persistence failed")?;

    let writer = ClashWriter::new(output_dir);
    if let Err(e) = emit::emit(&validated.ranked, &validated.report, &writer) {
        // recoverable: the next run overwrites the artifacts anyway
        error!("artifact emission failed: {e:#}");
    }

    println!(
        "{}",
        report::run_summary(
            scored.len(),
            parsed_total,
            &validated.report,
            &store.subscriptions()
        )
    );
    Ok(())
}

fn bail_if_cancelled(cancel: &CancelToken) -> Result<(), RunError> {
    if cancel.is_cancelled() {
        Err(RunError::Cancelled)
    } else {
        Ok(())
    }
}

/// Register the listed URLs into the store without fetching anything.
fn init(subscriptions: &Path, data_dir: &Path) -> anyhow::Result<()> {
    let urls = read_subscription_list(subscriptions)?;
    let mut store = Store::open(data_dir);
    let before = store.subscriptions().len();
    store.prune_absent(&urls);
    store.upsert_subscriptions(&urls);
    store.persist().context("store persistence failed")?;
    let after = store.subscriptions().len();
    info!(
        "registered {} urls ({} tracked, was {})",
        urls.len(),
        after,
        before
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.txt");
        fs::write(
            &path,
            "# header\n\nhttps://a.example/sub\n  # indented comment\n  https://b.example/sub  \n",
        )
        .unwrap();
        let urls = read_subscription_list(&path).unwrap();
        assert_eq!(urls, ["https://a.example/sub", "https://b.example/sub"]);
    }

    #[test]
    fn missing_list_is_fatal() {
        let err = read_subscription_list(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, RunError::SubscriptionList(..)));
    }
}
