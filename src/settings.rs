//! Runtime configuration, layered from built-in defaults and the process
//! environment.

use serde::Deserialize;

/// How the validator decides a node is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// TCP connect with latency measurement.
    Strict,
    /// DNS resolution only; resolvable names pass with a synthetic latency
    /// of zero.
    Lenient,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Fetcher per-request timeout in seconds.
    pub subscription_fetch_timeout_s: u64,
    /// Validator per-node timeout in seconds (DNS + connect share it).
    pub tcp_probe_timeout_s: u64,
    /// Probes in flight per batch.
    pub batch_size: usize,
    /// Quiescence between consecutive batches, seconds.
    pub batch_delay_s: f64,
    /// Pass threshold for measured connect latency.
    pub max_latency_ms: u64,
    /// Top-N nodes retained after ranking.
    pub max_output_nodes: usize,
    pub validation_mode: ValidationMode,
    /// Concurrent subscription downloads.
    pub fetcher_concurrency: usize,
}

impl Settings {
    /// Defaults overridden by matching environment variables
    /// (`BATCH_SIZE=50`, `VALIDATION_MODE=lenient`, ...).
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("subscription_fetch_timeout_s", 45_i64)?
            .set_default("tcp_probe_timeout_s", 8_i64)?
            .set_default("batch_size", 20_i64)?
            .set_default("batch_delay_s", 0.5_f64)?
            .set_default("max_latency_ms", 2000_i64)?
            .set_default("max_output_nodes", 100_i64)?
            .set_default("validation_mode", "strict")?
            .set_default("fetcher_concurrency", 8_i64)?
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_fetch_timeout_s: 45,
            tcp_probe_timeout_s: 8,
            batch_size: 20,
            batch_delay_s: 0.5,
            max_latency_ms: 2000,
            max_output_nodes: 100,
            validation_mode: ValidationMode::Strict,
            fetcher_concurrency: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.subscription_fetch_timeout_s, 45);
        assert_eq!(s.tcp_probe_timeout_s, 8);
        assert_eq!(s.batch_size, 20);
        assert_eq!(s.max_latency_ms, 2000);
        assert_eq!(s.max_output_nodes, 100);
        assert_eq!(s.validation_mode, ValidationMode::Strict);
    }

    #[test]
    fn mode_parses_from_lowercase_string() {
        let mode: ValidationMode = serde_json::from_str("\"lenient\"").unwrap();
        assert_eq!(mode, ValidationMode::Lenient);
    }
}
