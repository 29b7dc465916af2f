//! Turns fetched subscription bodies into a deduplicated node list.
//!
//! Body classification order: structured proxy-list document, then
//! whole-body base64, then raw URI lines. Unparseable lines are discarded
//! and counted; they never abort a run.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::codec;
use crate::fetch::FetchResult;
use crate::node::Node;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestTally {
    /// Nodes successfully parsed from this subscription, pre-dedup.
    pub parsed: usize,
    /// Nodes surviving global deduplication, attributed to this subscription.
    pub unique: usize,
    /// Non-empty lines or entries that failed to parse.
    pub discarded: usize,
}

#[derive(Debug, Default)]
pub struct Ingest {
    pub nodes: Vec<Node>,
    pub tallies: BTreeMap<String, IngestTally>,
}

/// Parse every fetched body and deduplicate on canonical identity,
/// first-wins, preserving first-seen order.
pub fn ingest(results: &[FetchResult]) -> Ingest {
    let mut out = Ingest::default();
    let mut seen: HashSet<String> = HashSet::new();

    for result in results {
        let tally = out.tallies.entry(result.url.clone()).or_default();
        let Some(body) = &result.body else {
            continue;
        };
        let (parsed, discarded) = parse_body(body);
        tally.parsed = parsed.len();
        tally.discarded = discarded;

        for mut node in parsed {
            node.source = result.url.clone();
            let key = node.canonical_key();
            if seen.insert(key) {
                tally.unique += 1;
                out.nodes.push(node);
            } else {
                debug!("duplicate node {} from {}", node.canonical_key(), result.url);
            }
        }
        info!(
            "{}: {} parsed, {} unique, {} discarded",
            result.url, tally.parsed, tally.unique, tally.discarded
        );
    }
    out
}

/// Parse one subscription body into nodes plus a discarded-line count.
pub fn parse_body(body: &str) -> (Vec<Node>, usize) {
    let body = body.trim();
    if body.is_empty() {
        return (Vec::new(), 0);
    }

    if codec::looks_like_proxy_list(body) {
        if let Ok((nodes, skipped)) = codec::parse_proxy_list(body) {
            return (nodes, skipped);
        }
    }

    if let Some(decoded) = try_decode_whole_body(body) {
        return parse_uri_lines(&decoded);
    }
    parse_uri_lines(body)
}

/// Whole-body base64 with padding repair; percent-encoded bodies are
/// unquoted first. Accepted only when the decoded text is plausibly larger
/// than the payload suggests line noise.
fn try_decode_whole_body(body: &str) -> Option<String> {
    let unquoted;
    let candidate = if body.contains('%') {
        unquoted = codec::pct_decode(body);
        unquoted.as_str()
    } else {
        body
    };
    let decoded = codec::decode_b64(candidate).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    (!text.is_empty() && text.len() > candidate.len() / 2).then_some(text)
}

fn parse_uri_lines(text: &str) -> (Vec<Node>, usize) {
    let mut nodes = Vec::new();
    let mut discarded = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !codec::is_node_uri(line) {
            discarded += 1;
            continue;
        }
        match codec::parse_uri(line) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                debug!("discarding line: {e}");
                discarded += 1;
            }
        }
    }
    (nodes, discarded)
}
