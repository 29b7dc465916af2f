//! Parsers and formatters for the supported proxy node encodings.
//!
//! Each scheme is a pair of pure functions (`parse`, `format`); round-tripping
//! a node through its scheme is stable. Dispatch is by URI prefix.

mod clash;
mod ss;
mod ssr;
mod trojan;
mod vless;
mod vmess;

pub use clash::{looks_like_proxy_list, parse_proxy_list, to_clash_mapping};

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::node::{Node, Params};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed uri: {0}")]
    MalformedUri(String),
    #[error("unsupported protocol scheme")]
    UnsupportedProtocol,
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

const URI_SCHEMES: &[&str] = &["ss://", "ssr://", "vmess://", "vless://", "trojan://"];

/// Whether a trimmed line starts with one of the supported URI prefixes.
pub fn is_node_uri(line: &str) -> bool {
    URI_SCHEMES.iter().any(|s| line.starts_with(s))
}

/// Parse a single node URI into a [`Node`].
pub fn parse_uri(line: &str) -> Result<Node, CodecError> {
    if line.starts_with("ss://") {
        ss::parse(line)
    } else if line.starts_with("ssr://") {
        ssr::parse(line)
    } else if line.starts_with("vmess://") {
        vmess::parse(line)
    } else if line.starts_with("vless://") {
        vless::parse(line)
    } else if line.starts_with("trojan://") {
        trojan::parse(line)
    } else if line.contains("://") {
        Err(CodecError::UnsupportedProtocol)
    } else {
        Err(CodecError::MalformedUri("missing scheme".into()))
    }
}

/// Emit a node in its scheme's canonical output form.
pub fn format_uri(node: &Node) -> String {
    match &node.params {
        Params::Ss { .. } => ss::format(node),
        Params::Ssr { .. } => ssr::format(node),
        Params::Vmess { .. } => vmess::format(node),
        Params::Vless { .. } => vless::format(node),
        Params::Trojan { .. } => trojan::format(node),
    }
}

// Everything urllib.parse.quote leaves alone stays unescaped.
const URI_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(crate) fn pct_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

pub(crate) fn pct_encode(s: &str) -> String {
    utf8_percent_encode(s, URI_ESCAPE).to_string()
}

/// Base64 decode tolerating missing padding, whitespace, and either alphabet.
pub(crate) fn decode_b64(raw: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let padded = match compact.len() % 4 {
        0 => compact,
        2 => format!("{compact}=="),
        3 => format!("{compact}="),
        _ => return Err(CodecError::DecodeFailed("invalid base64 length".into())),
    };
    let engine = if padded.contains('-') || padded.contains('_') {
        &URL_SAFE
    } else {
        &STANDARD
    };
    engine
        .decode(padded.as_bytes())
        .map_err(|e| CodecError::DecodeFailed(e.to_string()))
}

pub(crate) fn decode_b64_str(raw: &str) -> Result<String, CodecError> {
    let bytes = decode_b64(raw)?;
    String::from_utf8(bytes).map_err(|e| CodecError::DecodeFailed(e.to_string()))
}

pub(crate) fn encode_b64_urlsafe(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Split `host:port` or `[v6]:port`; the returned host is lowercased and
/// bracket-free.
pub(crate) fn split_host_port(s: &str) -> Result<(String, u16), CodecError> {
    let (host, port_str) = if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| CodecError::MalformedUri("unterminated ipv6 literal".into()))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| CodecError::MalformedUri("missing port".into()))?;
        (host, port)
    } else {
        s.rsplit_once(':')
            .ok_or_else(|| CodecError::MalformedUri("missing port".into()))?
    };
    if host.is_empty() {
        return Err(CodecError::MalformedUri("empty host".into()));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| CodecError::MalformedUri(format!("bad port {port_str:?}")))?;
    if port == 0 {
        return Err(CodecError::MalformedUri("port out of range".into()));
    }
    Ok((host.to_ascii_lowercase(), port))
}

/// Split a trailing `#fragment` off a URI body, percent-decoding the name.
pub(crate) fn split_fragment(body: &str) -> (&str, Option<String>) {
    match body.split_once('#') {
        Some((rest, frag)) if !frag.is_empty() => (rest, Some(pct_decode(frag))),
        Some((rest, _)) => (rest, None),
        None => (body, None),
    }
}

/// Parse an `&`-joined querystring into ordered key/value pairs.
pub(crate) fn parse_query(query: &str) -> std::collections::BTreeMap<String, String> {
    let mut map = std::collections::BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(pct_decode(k), pct_decode(v));
    }
    map
}

pub(crate) fn format_query(map: &std::collections::BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", pct_encode(k), pct_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
