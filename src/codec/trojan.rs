//! Trojan `trojan://password@host:port?query#name` URIs.

use crate::node::{Node, Params, Protocol};

use super::{
    format_query, parse_query, pct_decode, pct_encode, split_fragment, split_host_port, CodecError,
};

pub fn parse(uri: &str) -> Result<Node, CodecError> {
    let body = uri
        .strip_prefix("trojan://")
        .ok_or_else(|| CodecError::MalformedUri("not a trojan uri".into()))?;
    let (body, name) = split_fragment(body);
    let (body, query) = match body.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (body, Default::default()),
    };
    let (password, addr) = body
        .rsplit_once('@')
        .ok_or_else(|| CodecError::MalformedUri("missing user info".into()))?;
    if password.is_empty() {
        return Err(CodecError::MalformedUri("empty password".into()));
    }
    let (server, port) = split_host_port(addr)?;

    Ok(Node {
        name: name.unwrap_or_else(|| Node::synthesize_name(Protocol::Trojan, &server, port)),
        server,
        port,
        params: Params::Trojan {
            password: pct_decode(password),
            query,
        },
        source: String::new(),
        latency_ms: None,
    })
}

pub fn format(node: &Node) -> String {
    let Params::Trojan { password, query } = &node.params else {
        unreachable!("trojan formatter called with non-trojan params");
    };
    let mut uri = format!(
        "trojan://{}@{}:{}",
        pct_encode(password),
        node.uri_host(),
        node.port
    );
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
        let node =
            parse("trojan://s3cret@tr.example.com:443?sni=tr.example.com&allowInsecure=1#de-01")
                .unwrap();
        assert_eq!(node.server, "tr.example.com");
        assert_eq!(node.port, 443);
        assert_eq!(node.name, "de-01");
        let Params::Trojan { password, query } = &node.params else {
            panic!("wrong variant");
        };
        assert_eq!(password, "s3cret");
        assert_eq!(query.get("allowInsecure").map(String::as_str), Some("1"));
    }

    #[test]
    fn round_trip_with_escaped_password() {
        let node = parse("trojan://p%40ss%3Aword@h.io:8443?peer=h.io#n").unwrap();
        let Params::Trojan { password, .. } = &node.params else {
            panic!("wrong variant");
        };
        assert_eq!(password, "p@ss:word");
        assert_eq!(parse(&format(&node)).unwrap(), node);
    }

    #[test]
    fn missing_name_is_synthesized() {
        let node = parse("trojan://pw@h.io:443").unwrap();
        assert_eq!(node.name, "trojan-h.io:443");
    }

    #[test]
    fn rejects_missing_password() {
        assert!(parse("trojan://@h.io:443#n").is_err());
    }
}
