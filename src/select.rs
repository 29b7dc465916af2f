//! Per-run subscription selection.
//!
//! Protected subscriptions are always taken; the rest are chosen by tier,
//! with the probabilistic tiers driven by a PRNG seeded from the wall-clock
//! day so that re-running within a day is stable.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::score::Tier;
use crate::store::SubscriptionState;

/// Default PRNG seed: days since the Unix epoch.
pub fn default_seed() -> u64 {
    (Utc::now().timestamp() / 86_400) as u64
}

/// Choose the subscriptions to fetch this run.
///
/// Input order is preserved; the returned states carry the selection
/// effects (use_count, protection decrement, last-selected week) and are
/// persisted by the caller at end-of-run.
pub fn select(
    states: &[SubscriptionState],
    run_number: u64,
    seed: u64,
) -> Vec<SubscriptionState> {
    let mut rng = StdRng::seed_from_u64(seed);
    let week = run_number / 7;
    let mut selected = Vec::new();

    for state in states {
        let take = if state.protection_counter > 0 {
            true
        } else {
            match state.tier {
                Tier::Daily => true,
                Tier::Often => rng.random_bool(2.0 / 3.0),
                Tier::Sometimes => rng.random_bool(1.0 / 3.0),
                Tier::Rarely => state.last_selected_week != Some(week),
                Tier::Suspended => false,
            }
        };
        if !take {
            continue;
        }
        let mut state = state.clone();
        debug!(url = %state.url, tier = ?state.tier, protected = state.protection_counter > 0, "selected");
        state.protection_counter = state.protection_counter.saturating_sub(1);
        state.use_count += 1;
        state.last_selected_week = Some(week);
        selected.push(state);
    }
    selected
}
