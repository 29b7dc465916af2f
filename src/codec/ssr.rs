//! ShadowsocksR `ssr://` URIs.
//!
//! The whole body is base64; the decoded form is
//! `host:port:protocol:method:obfs:b64(password)/?obfsparam=b64&protoparam=b64&remarks=b64&group=b64`.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;

use crate::node::{Node, Params, Protocol};

use super::{decode_b64_str, CodecError};

pub fn parse(uri: &str) -> Result<Node, CodecError> {
    let body = uri
        .strip_prefix("ssr://")
        .ok_or_else(|| CodecError::MalformedUri("not an ssr uri".into()))?;
    let decoded = decode_b64_str(body)?;
    let (main, query) = match decoded.split_once("/?") {
        Some((m, q)) => (m, q),
        None => (decoded.as_str(), ""),
    };

    // host may contain ':' (ipv6), so split the five rightmost fields
    let mut fields: Vec<&str> = main.rsplitn(6, ':').collect();
    if fields.len() != 6 {
        return Err(CodecError::MalformedUri("expected six colon fields".into()));
    }
    fields.reverse();
    let server = fields[0]
        .trim_matches(|c| c == '[' || c == ']')
        .to_ascii_lowercase();
    if server.is_empty() {
        return Err(CodecError::MalformedUri("empty host".into()));
    }
    let port: u16 = fields[1]
        .parse()
        .map_err(|_| CodecError::MalformedUri(format!("bad port {:?}", fields[1])))?;
    if port == 0 {
        return Err(CodecError::MalformedUri("port out of range".into()));
    }
    let protocol = fields[2].to_string();
    let method = fields[3].to_string();
    let obfs = fields[4].to_string();
    let password = decode_b64_str(fields[5])?;

    let mut obfs_param = String::new();
    let mut proto_param = String::new();
    let mut group = String::new();
    let mut remarks = None;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        // parameter values are themselves base64; tolerate plain text
        let value = decode_b64_str(value).unwrap_or_else(|_| value.to_string());
        match key {
            "obfsparam" => obfs_param = value,
            "protoparam" => proto_param = value,
            "remarks" => remarks = Some(value),
            "group" => group = value,
            _ => {}
        }
    }

    Ok(Node {
        name: remarks
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| Node::synthesize_name(Protocol::Ssr, &server, port)),
        server,
        port,
        params: Params::Ssr {
            protocol,
            method,
            obfs,
            password,
            obfs_param,
            proto_param,
            group,
        },
        source: String::new(),
        latency_ms: None,
    })
}

pub fn format(node: &Node) -> String {
    let Params::Ssr {
        protocol,
        method,
        obfs,
        password,
        obfs_param,
        proto_param,
        group,
    } = &node.params
    else {
        unreachable!("ssr formatter called with non-ssr params");
    };
    let b64 = |s: &str| STANDARD_NO_PAD.encode(s.as_bytes());
    let main = format!(
        "{}:{}:{}:{}:{}:{}",
        node.uri_host(),
        node.port,
        protocol,
        method,
        obfs,
        b64(password)
    );
    let query = format!(
        "obfsparam={}&protoparam={}&remarks={}&group={}",
        b64(obfs_param),
        b64(proto_param),
        b64(&node.name),
        b64(group)
    );
    format!("ssr://{}", b64(&format!("{main}/?{query}")))
}
