//! Subscription scoring: a pure function from run history to a 0-100 score
//! and its usage tier. The store is the only side-effecting boundary; this
//! module does no I/O.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::store::HistoryEntry;

/// Score granted to a subscription with no history yet.
pub const INITIAL_SCORE: u8 = 75;

/// Valid-node count that earns full volume credit.
const TARGET_VALID: f64 = 20.0;

/// Runs considered by the windowed signals.
const WINDOW: usize = 5;

const W_SUCCESS: f64 = 0.40;
const W_LATENCY: f64 = 0.30;
const W_VOLUME: f64 = 0.20;
const W_STABILITY: f64 = 0.10;

/// Usage-frequency tier, a pure function of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Daily,
    Often,
    Sometimes,
    Rarely,
    Suspended,
}

pub fn tier_of(score: u8) -> Tier {
    match score {
        90..=100 => Tier::Daily,
        70..=89 => Tier::Often,
        50..=69 => Tier::Sometimes,
        30..=49 => Tier::Rarely,
        _ => Tier::Suspended,
    }
}

/// Compute the score for a subscription from its run history.
///
/// Four weighted signals over the last [`WINDOW`] entries: success rate
/// (0.40), latency quality (0.30), last-run volume (0.20), and valid-count
/// stability (0.10). Runs whose fetch failed contribute zero to the first
/// two signals.
pub fn compute_score(history: &[HistoryEntry], settings: &Settings) -> u8 {
    if history.is_empty() {
        return INITIAL_SCORE;
    }
    let window = &history[history.len().saturating_sub(WINDOW)..];
    let max_latency = settings.max_latency_ms as f64;

    let success_rate = window
        .iter()
        .map(|h| {
            if h.fetch_ok {
                h.valid_nodes as f64 / (h.total_nodes.max(1)) as f64
            } else {
                0.0
            }
        })
        .sum::<f64>()
        / window.len() as f64;

    let latency_quality = window
        .iter()
        .map(|h| {
            if h.fetch_ok && h.valid_nodes > 0 {
                (1.0 - h.avg_latency_ms / max_latency).max(0.0)
            } else {
                0.0
            }
        })
        .sum::<f64>()
        / window.len() as f64;

    let last = history.last().expect("history is non-empty");
    let last_valid = if last.fetch_ok { last.valid_nodes } else { 0 };
    let volume = (last_valid as f64 / TARGET_VALID).min(1.0);

    let counts: Vec<f64> = window.iter().map(|h| h.valid_nodes as f64).collect();
    let mean = counts.iter().sum::<f64>() / counts.len() as f64;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
    let stability = (1.0 - variance.sqrt() / mean.max(1.0)).clamp(0.0, 1.0);

    let weighted = W_SUCCESS * success_rate
        + W_LATENCY * latency_quality
        + W_VOLUME * volume
        + W_STABILITY * stability;
    (weighted * 100.0).round().clamp(0.0, 100.0) as u8
}
