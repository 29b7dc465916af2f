//! Shadowsocks `ss://` URIs.
//!
//! Two accepted shapes: `ss://<b64(method:password)>@host:port#name` and the
//! legacy `ss://<b64(method:password@host:port)>#name`. Base64 may be either
//! alphabet with optional padding.

use crate::node::{Node, Params, Protocol};

use super::{
    decode_b64_str, encode_b64_urlsafe, pct_encode, split_fragment, split_host_port, CodecError,
};

pub fn parse(uri: &str) -> Result<Node, CodecError> {
    let body = uri
        .strip_prefix("ss://")
        .ok_or_else(|| CodecError::MalformedUri("not an ss uri".into()))?;
    let (body, name) = split_fragment(body);

    let (method, password, server, port) = if let Some((payload, addr)) = body.rsplit_once('@') {
        let creds = decode_b64_str(payload)?;
        let (method, password) = creds
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedUri("missing method separator".into()))?;
        let (server, port) = split_host_port(addr)?;
        (method.to_string(), password.to_string(), server, port)
    } else {
        let decoded = decode_b64_str(body)?;
        // password may itself contain '@'; the address is after the last one
        let (creds, addr) = decoded
            .rsplit_once('@')
            .ok_or_else(|| CodecError::MalformedUri("missing address".into()))?;
        let (method, password) = creds
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedUri("missing method separator".into()))?;
        let (server, port) = split_host_port(addr)?;
        (method.to_string(), password.to_string(), server, port)
    };

    Ok(Node {
        name: name.unwrap_or_else(|| Node::synthesize_name(Protocol::Ss, &server, port)),
        server,
        port,
        params: Params::Ss { method, password },
        source: String::new(),
        latency_ms: None,
    })
}

pub fn format(node: &Node) -> String {
    let Params::Ss { method, password } = &node.params else {
        unreachable!("ss formatter called with non-ss params");
    };
    let creds = encode_b64_urlsafe(&format!("{method}:{password}"));
    format!(
        "ss://{}@{}:{}#{}",
        creds,
        node.uri_host(),
        node.port,
        pct_encode(&node.name)
    )
}
