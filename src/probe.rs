//! Bounded-concurrency TCP connectivity validation.
//!
//! Probes run in batches of `batch_size` with a quiescence delay between
//! batches to throttle the host's outbound connection rate. A probe opens a
//! TCP connection, measures the handshake latency, and closes the socket at
//! once; no application bytes are ever sent. DNS resolution shares the
//! probe's timeout budget.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::net::{lookup_host, TcpStream};
use tracing::info;

use crate::cancel::CancelToken;
use crate::node::Node;
use crate::settings::{Settings, ValidationMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Refused,
    Unreachable,
    DnsFailed,
    Cancelled,
    Other(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("timeout"),
            ProbeFailure::Refused => f.write_str("refused"),
            ProbeFailure::Unreachable => f.write_str("unreachable"),
            ProbeFailure::DnsFailed => f.write_str("dns_failed"),
            ProbeFailure::Cancelled => f.write_str("cancelled"),
            ProbeFailure::Other(msg) => write!(f, "other({msg})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub latency_ms: Option<u64>,
    /// `None` means the node is valid.
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    fn valid(latency_ms: u64) -> Self {
        Self {
            latency_ms: Some(latency_ms),
            failure: None,
        }
    }

    fn failed(failure: ProbeFailure) -> Self {
        Self {
            latency_ms: None,
            failure: Some(failure),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SubStat {
    pub total: u64,
    pub valid: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub total_nodes: u64,
    pub valid_nodes: u64,
    pub per_subscription: BTreeMap<String, SubStat>,
    pub failure_counts: BTreeMap<String, u64>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl ValidationReport {
    pub fn success_rate(&self) -> f64 {
        self.valid_nodes as f64 / (self.total_nodes.max(1)) as f64
    }
}

pub struct Validated {
    /// Valid nodes sorted by ascending latency (stable on ties), truncated
    /// to `max_output_nodes`.
    pub ranked: Vec<Node>,
    pub report: ValidationReport,
}

/// Probe every node and produce the ranked subset plus the run report.
pub async fn validate(
    mut nodes: Vec<Node>,
    settings: &Settings,
    cancel: &CancelToken,
) -> Validated {
    let started = Instant::now();
    let batch_size = settings.batch_size.max(1);
    let batch_delay = Duration::from_secs_f64(settings.batch_delay_s.max(0.0));
    let total_batches = nodes.len().div_ceil(batch_size);

    let mut outcomes: Vec<ProbeOutcome> = Vec::with_capacity(nodes.len());
    for (batch_no, batch) in nodes.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            outcomes.extend(
                std::iter::repeat_with(|| ProbeOutcome::failed(ProbeFailure::Cancelled))
                    .take(nodes.len() - outcomes.len()),
            );
            break;
        }
        let batch_outcomes = join_all(
            batch
                .iter()
                .map(|node| probe_node(node, settings, cancel)),
        )
        .await;
        outcomes.extend(batch_outcomes);

        let valid_so_far = outcomes.iter().filter(|o| o.is_valid()).count();
        info!(
            "batch {}/{} complete: {}/{} valid",
            batch_no + 1,
            total_batches,
            valid_so_far,
            outcomes.len()
        );
        if batch_no + 1 < total_batches && !batch_delay.is_zero() && !cancel.is_cancelled() {
            tokio::time::sleep(batch_delay).await;
        }
    }

    for (node, outcome) in nodes.iter_mut().zip(&outcomes) {
        if outcome.is_valid() {
            node.latency_ms = outcome.latency_ms;
        }
    }

    let report = build_report(&nodes, &outcomes, started.elapsed(), cancel.is_cancelled());
    let ranked = rank(&nodes, &outcomes, settings.max_output_nodes);
    Validated { ranked, report }
}

/// One probe, bounded by the shared per-node timeout and the run-level
/// cancellation signal.
async fn probe_node(node: &Node, settings: &Settings, cancel: &CancelToken) -> ProbeOutcome {
    let budget = Duration::from_secs(settings.tcp_probe_timeout_s);
    let attempt = async {
        match settings.validation_mode {
            ValidationMode::Lenient => probe_dns(node).await,
            ValidationMode::Strict => probe_tcp(node, settings.max_latency_ms).await,
        }
    };
    tokio::select! {
        result = tokio::time::timeout(budget, attempt) => {
            result.unwrap_or(ProbeOutcome::failed(ProbeFailure::Timeout))
        }
        _ = cancel.cancelled() => ProbeOutcome::failed(ProbeFailure::Cancelled),
    }
}

async fn probe_dns(node: &Node) -> ProbeOutcome {
    let target = format!("{}:{}", node.uri_host(), node.port);
    let result = match lookup_host(&target).await {
        Ok(mut addrs) => {
            if addrs.next().is_some() {
                ProbeOutcome::valid(0)
            } else {
                ProbeOutcome::failed(ProbeFailure::DnsFailed)
            }
        }
        Err(_) => ProbeOutcome::failed(ProbeFailure::DnsFailed),
    };
    result
}

async fn probe_tcp(node: &Node, max_latency_ms: u64) -> ProbeOutcome {
    let target = format!("{}:{}", node.uri_host(), node.port);
    let addr = match lookup_host(&target).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => return ProbeOutcome::failed(ProbeFailure::DnsFailed),
        },
        Err(_) => return ProbeOutcome::failed(ProbeFailure::DnsFailed),
    };

    let start = Instant::now();
    match TcpStream::connect(addr).await {
        Ok(stream) => {
            let latency = start.elapsed().as_millis() as u64;
            drop(stream);
            if latency <= max_latency_ms {
                ProbeOutcome::valid(latency)
            } else {
                ProbeOutcome::failed(ProbeFailure::Other(format!(
                    "latency {latency}ms over threshold"
                )))
            }
        }
        Err(e) => ProbeOutcome::failed(classify_io_error(&e)),
    }
}

fn classify_io_error(e: &std::io::Error) -> ProbeFailure {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionRefused => ProbeFailure::Refused,
        ErrorKind::TimedOut => ProbeFailure::Timeout,
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => ProbeFailure::Unreachable,
        _ => ProbeFailure::Other(e.to_string()),
    }
}

fn build_report(
    nodes: &[Node],
    outcomes: &[ProbeOutcome],
    elapsed: Duration,
    cancelled: bool,
) -> ValidationReport {
    let mut report = ValidationReport {
        total_nodes: nodes.len() as u64,
        duration_ms: elapsed.as_millis() as u64,
        cancelled,
        ..Default::default()
    };
    let mut latencies: BTreeMap<&str, Vec<u64>> = BTreeMap::new();

    for (node, outcome) in nodes.iter().zip(outcomes) {
        let stat = report
            .per_subscription
            .entry(node.source.clone())
            .or_default();
        stat.total += 1;
        match &outcome.failure {
            None => {
                report.valid_nodes += 1;
                stat.valid += 1;
                latencies
                    .entry(node.source.as_str())
                    .or_default()
                    .push(outcome.latency_ms.unwrap_or(0));
            }
            Some(failure) => {
                let key = match failure {
                    ProbeFailure::Other(_) => "other".to_string(),
                    f => f.to_string(),
                };
                *report.failure_counts.entry(key).or_default() += 1;
            }
        }
    }
    for (url, lats) in latencies {
        let avg = lats.iter().sum::<u64>() as f64 / lats.len() as f64;
        if let Some(stat) = report.per_subscription.get_mut(url) {
            stat.avg_latency_ms = avg;
        }
    }
    report
}

/// Stable ascending-latency ranking of the valid nodes, truncated to `max`.
fn rank(nodes: &[Node], outcomes: &[ProbeOutcome], max: usize) -> Vec<Node> {
    let mut ranked: Vec<Node> = nodes
        .iter()
        .zip(outcomes)
        .filter(|(_, o)| o.is_valid())
        .map(|(n, _)| n.clone())
        .collect();
    ranked.sort_by_key(|n| n.latency_ms.unwrap_or(u64::MAX));
    ranked.truncate(max);
    ranked
}
