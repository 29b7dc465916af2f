//! VLESS `vless://uuid@host:port?query#name` URIs.
//!
//! Query keys are kept verbatim (recognized or not) so the downstream writer
//! can emit them faithfully.

use crate::node::{Node, Params, Protocol};

use super::{
    format_query, parse_query, pct_encode, split_fragment, split_host_port, CodecError,
};

pub fn parse(uri: &str) -> Result<Node, CodecError> {
    let body = uri
        .strip_prefix("vless://")
        .ok_or_else(|| CodecError::MalformedUri("not a vless uri".into()))?;
    let (body, name) = split_fragment(body);
    let (body, query) = match body.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (body, Default::default()),
    };
    let (uuid, addr) = body
        .rsplit_once('@')
        .ok_or_else(|| CodecError::MalformedUri("missing user info".into()))?;
    if uuid.is_empty() {
        return Err(CodecError::MalformedUri("empty uuid".into()));
    }
    let (server, port) = split_host_port(addr)?;

    Ok(Node {
        name: name.unwrap_or_else(|| Node::synthesize_name(Protocol::Vless, &server, port)),
        server,
        port,
        params: Params::Vless {
            uuid: uuid.to_string(),
            query,
        },
        source: String::new(),
        latency_ms: None,
    })
}

pub fn format(node: &Node) -> String {
    let Params::Vless { uuid, query } = &node.params else {
        unreachable!("vless formatter called with non-vless params");
    };
    let mut uri = format!("vless://{}@{}:{}", uuid, node.uri_host(), node.port);
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(&format_query(query));
    }
    uri.push('#');
    uri.push_str(&pct_encode(&node.name));
    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let node = parse(
            "vless://9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d@cdn.example.com:443?encryption=none&flow=xtls-rprx-vision&security=reality&sni=cdn.example.com&fp=chrome#jp-01",
        )
        .unwrap();
        assert_eq!(node.server, "cdn.example.com");
        assert_eq!(node.port, 443);
        assert_eq!(node.name, "jp-01");
        let Params::Vless { uuid, query } = &node.params else {
            panic!("wrong variant");
        };
        assert_eq!(uuid, "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d");
        assert_eq!(query.get("flow").map(String::as_str), Some("xtls-rprx-vision"));
        assert_eq!(query.get("fp").map(String::as_str), Some("chrome"));
    }

    #[test]
    fn unknown_query_keys_survive() {
        let node = parse("vless://u@h.io:443?pbk=abc&sid=0123&custom=zzz#n").unwrap();
        let reparsed = parse(&format(&node)).unwrap();
        let Params::Vless { query, .. } = &reparsed.params else {
            panic!("wrong variant");
        };
        assert_eq!(query.get("custom").map(String::as_str), Some("zzz"));
        assert_eq!(reparsed, node);
    }

    #[test]
    fn percent_encoded_name_and_path() {
        let node = parse("vless://u@h.io:443?path=%2Fws%2Fv1#Tokyo%2001").unwrap();
        assert_eq!(node.name, "Tokyo 01");
        let Params::Vless { query, .. } = &node.params else {
            panic!("wrong variant");
        };
        assert_eq!(query.get("path").map(String::as_str), Some("/ws/v1"));
        assert_eq!(parse(&format(&node)).unwrap(), node);
    }

    #[test]
    fn ipv6_host_round_trips() {
        let node = parse("vless://u@[2001:db8::2]:8443?type=grpc#v6").unwrap();
        assert_eq!(node.server, "2001:db8::2");
        assert_eq!(parse(&format(&node)).unwrap(), node);
    }

    #[test]
    fn rejects_missing_uuid() {
        assert!(parse("vless://@h.io:443#n").is_err());
    }
}
