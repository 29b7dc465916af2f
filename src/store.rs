//! Durable state: subscription reputations, the score transition log, and
//! the IP-geo cache. All files are human-inspectable JSON under one data
//! directory; writes go to a temp sibling and are renamed into place.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::score::Tier;

/// Runs of history retained per subscription.
pub const HISTORY_CAP: usize = 20;

/// Guaranteed-selection runs granted to a newly registered subscription.
pub const NEW_SUB_PROTECTION: u32 = 3;

/// Absent subscriptions younger than this survive one more cycle.
const PRUNE_GRACE_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub total_nodes: u64,
    pub valid_nodes: u64,
    pub avg_latency_ms: f64,
    pub fetch_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub url: String,
    pub name: String,
    pub created_at: i64,
    pub use_count: u64,
    pub success_count: u64,
    pub score: u8,
    pub tier: Tier,
    pub protection_counter: u32,
    #[serde(default)]
    pub last_selected_week: Option<u64>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SubscriptionState {
    fn new(url: &str, now: i64) -> Self {
        Self {
            url: url.to_string(),
            name: host_of(url),
            created_at: now,
            use_count: 0,
            success_count: 0,
            score: crate::score::INITIAL_SCORE,
            tier: crate::score::tier_of(crate::score::INITIAL_SCORE),
            protection_counter: NEW_SUB_PROTECTION,
            last_selected_week: None,
            history: Vec::new(),
        }
    }

    /// Append a run record, keeping the most recent [`HISTORY_CAP`] entries.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    fn last_activity(&self) -> i64 {
        self.history
            .last()
            .map(|h| h.timestamp)
            .unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoEntry {
    pub country_code: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreTransition {
    url: String,
    timestamp: i64,
    old_score: u8,
    new_score: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    run_number: u64,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    subscriptions: BTreeMap<String, SubscriptionState>,
}

pub struct Store {
    dir: PathBuf,
    db: Database,
    ip_cache: BTreeMap<String, GeoEntry>,
    pending_transitions: Vec<ScoreTransition>,
}

impl Store {
    /// Open the store, tolerating missing or corrupt files.
    pub fn open(dir: &Path) -> Self {
        let db = load_json(&dir.join("subscriptions.json")).unwrap_or_default();
        let ip_cache = load_json(&dir.join("ip_cache.json")).unwrap_or_default();
        Self {
            dir: dir.to_path_buf(),
            db,
            ip_cache,
            pending_transitions: Vec::new(),
        }
    }

    pub fn run_number(&self) -> u64 {
        self.db.run_number
    }

    /// Advance the global run counter and return the new run number.
    pub fn begin_run(&mut self) -> u64 {
        self.db.run_number += 1;
        self.db.run_number
    }

    /// Register any previously-unseen URLs, returning the states for the
    /// given URLs in list order.
    pub fn upsert_subscriptions(&mut self, urls: &[String]) -> Vec<SubscriptionState> {
        let now = Utc::now().timestamp();
        for url in urls {
            self.db
                .subscriptions
                .entry(url.clone())
                .or_insert_with(|| SubscriptionState::new(url, now));
        }
        urls.iter()
            .filter_map(|u| self.db.subscriptions.get(u).cloned())
            .collect()
    }

    /// Drop subscriptions that are absent from the list and stale by more
    /// than one cycle.
    pub fn prune_absent(&mut self, urls: &[String]) {
        let keep: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let cutoff = Utc::now().timestamp() - PRUNE_GRACE_SECS;
        self.db
            .subscriptions
            .retain(|url, state| keep.contains(url.as_str()) || state.last_activity() >= cutoff);
    }

    /// Replace a subscription's state (selection and scoring effects are
    /// applied here, once, before persist).
    pub fn apply(&mut self, state: SubscriptionState) {
        let old = self.db.subscriptions.get(&state.url).map(|s| s.score);
        if let Some(old_score) = old {
            if old_score != state.score {
                self.pending_transitions.push(ScoreTransition {
                    url: state.url.clone(),
                    timestamp: Utc::now().timestamp(),
                    old_score,
                    new_score: state.score,
                });
            }
        }
        self.db.subscriptions.insert(state.url.clone(), state);
    }

    /// All known subscriptions, alphabetically by URL.
    pub fn subscriptions(&self) -> Vec<SubscriptionState> {
        self.db.subscriptions.values().cloned().collect()
    }

    pub fn get_ip_geo(&self, key: &str) -> Option<&GeoEntry> {
        self.ip_cache.get(key)
    }

    pub fn set_ip_geo(&mut self, key: &str, entry: GeoEntry) {
        self.ip_cache.entry(key.to_string()).or_insert(entry);
    }

    /// Write all state files. Each file is replaced atomically; the score
    /// transition log is append-only.
    pub fn persist(&mut self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.db.last_update = Some(Utc::now().to_rfc3339());

        write_atomic(
            &self.dir.join("subscriptions.json"),
            serde_json::to_string_pretty(&self.db)?.as_bytes(),
        )?;
        write_atomic(
            &self.dir.join("ip_cache.json"),
            serde_json::to_string_pretty(&self.ip_cache)?.as_bytes(),
        )?;

        if !self.pending_transitions.is_empty() {
            let mut log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join("score_history.jsonl"))?;
            for t in self.pending_transitions.drain(..) {
                writeln!(log, "{}", serde_json::to_string(&t)?)?;
            }
        }
        Ok(())
    }
}

fn load_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Option<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("failed reading {}: {e}; starting empty", path.display());
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("corrupt state file {}: {e}; starting empty", path.display());
            None
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Display name for a subscription: the host part of its URL.
pub fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = match host.strip_prefix('[') {
        Some(v6) => v6.split(']').next().unwrap_or(v6),
        None => host.split(':').next().unwrap_or(host),
    };
    host.to_ascii_lowercase()
}
