//! The structured multi-document proxy list: a YAML document with a
//! top-level `proxies:` sequence, each entry a mapping whose `type` field
//! selects the protocol.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::node::{Node, Params, Protocol};

use super::CodecError;

/// Cheap pre-check before attempting a full YAML parse of the body.
pub fn looks_like_proxy_list(text: &str) -> bool {
    text.lines()
        .take(30)
        .any(|l| l.trim_start().starts_with("proxies:"))
}

/// Parse a proxy-list document. Returns the nodes plus the count of entries
/// that were skipped as unparseable.
pub fn parse_proxy_list(text: &str) -> Result<(Vec<Node>, usize), CodecError> {
    let doc: Value =
        serde_yaml::from_str(text).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
    let proxies = doc
        .get("proxies")
        .and_then(Value::as_sequence)
        .ok_or_else(|| CodecError::DecodeFailed("no proxies sequence".into()))?;

    let mut nodes = Vec::new();
    let mut skipped = 0usize;
    for entry in proxies {
        match entry.as_mapping().and_then(entry_to_node) {
            Some(node) => nodes.push(node),
            None => skipped += 1,
        }
    }
    Ok((nodes, skipped))
}

fn get_str(m: &Mapping, key: &str) -> Option<String> {
    match m.get(&Value::String(key.into()))? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_port(m: &Mapping, key: &str) -> Option<u16> {
    let port = match m.get(&Value::String(key.into()))? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (1..=65535).contains(&port).then_some(port as u16)
}

fn scalar_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(serde_json::Value::String(s.clone())),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => serde_json::to_value(n).ok(),
        _ => None,
    }
}

/// Remaining scalar fields of an entry, minus the ones already consumed.
fn leftover_strings(m: &Mapping, consumed: &[&str]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for k in m.keys() {
        let Some(key) = k.as_str() else { continue };
        if consumed.contains(&key) {
            continue;
        }
        // nested structures are not representable in a query bag
        if let Some(s) = get_str(m, key) {
            out.insert(key.to_string(), s);
        }
    }
    out
}

fn entry_to_node(m: &Mapping) -> Option<Node> {
    let protocol = Protocol::from_str(&get_str(m, "type")?.to_ascii_lowercase())?;
    let server = get_str(m, "server")?.trim().to_ascii_lowercase();
    if server.is_empty() {
        return None;
    }
    let port = get_port(m, "port")?;
    let name = get_str(m, "name")
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| Node::synthesize_name(protocol, &server, port));

    let params = match protocol {
        Protocol::Ss => Params::Ss {
            method: get_str(m, "cipher").unwrap_or_else(|| "aes-256-gcm".into()),
            password: get_str(m, "password").unwrap_or_default(),
        },
        Protocol::Ssr => Params::Ssr {
            protocol: get_str(m, "protocol").unwrap_or_else(|| "origin".into()),
            method: get_str(m, "cipher").unwrap_or_else(|| "aes-256-cfb".into()),
            obfs: get_str(m, "obfs").unwrap_or_else(|| "plain".into()),
            password: get_str(m, "password").unwrap_or_default(),
            obfs_param: get_str(m, "obfs-param").unwrap_or_default(),
            proto_param: get_str(m, "protocol-param").unwrap_or_default(),
            group: get_str(m, "group").unwrap_or_default(),
        },
        Protocol::Vmess => {
            let consumed = [
                "type", "name", "server", "port", "uuid", "alterId", "cipher", "network",
                "tls", "sni", "servername",
            ];
            let mut extra = BTreeMap::new();
            for (k, v) in m {
                let Some(key) = k.as_str() else { continue };
                if consumed.contains(&key) {
                    continue;
                }
                if let Some(json) = scalar_to_json(v) {
                    extra.insert(key.to_string(), json);
                }
            }
            Params::Vmess {
                uuid: get_str(m, "uuid").unwrap_or_default(),
                alter_id: get_str(m, "alterId")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                cipher: get_str(m, "cipher").unwrap_or_else(|| "auto".into()),
                transport: get_str(m, "network").unwrap_or_else(|| "tcp".into()),
                header_type: "none".into(),
                host: String::new(),
                path: String::new(),
                tls: get_str(m, "tls")
                    .filter(|t| t == "true" || t == "tls")
                    .map(|_| "tls".to_string())
                    .unwrap_or_default(),
                sni: get_str(m, "sni")
                    .or_else(|| get_str(m, "servername"))
                    .unwrap_or_default(),
                extra,
            }
        }
        Protocol::Vless => Params::Vless {
            uuid: get_str(m, "uuid").unwrap_or_default(),
            query: leftover_strings(m, &["type", "name", "server", "port", "uuid"]),
        },
        Protocol::Trojan => Params::Trojan {
            password: get_str(m, "password").unwrap_or_default(),
            query: leftover_strings(m, &["type", "name", "server", "port", "password"]),
        },
    };

    Some(Node {
        name,
        server,
        port,
        params,
        source: String::new(),
        latency_ms: None,
    })
}

/// Render a node as a proxy-list entry for the emitted configuration files.
pub fn to_clash_mapping(node: &Node) -> Value {
    let mut m = Mapping::new();
    let mut put = |k: &str, v: Value| {
        m.insert(Value::String(k.into()), v);
    };
    put("name", Value::String(node.name.clone()));
    put("type", Value::String(node.protocol().as_str().into()));
    put("server", Value::String(node.server.clone()));
    put("port", Value::Number(node.port.into()));

    match &node.params {
        Params::Ss { method, password } => {
            put("cipher", Value::String(method.clone()));
            put("password", Value::String(password.clone()));
            put("udp", Value::Bool(true));
        }
        Params::Ssr {
            protocol,
            method,
            obfs,
            password,
            obfs_param,
            proto_param,
            group,
        } => {
            put("cipher", Value::String(method.clone()));
            put("password", Value::String(password.clone()));
            put("protocol", Value::String(protocol.clone()));
            put("obfs", Value::String(obfs.clone()));
            if !obfs_param.is_empty() {
                put("obfs-param", Value::String(obfs_param.clone()));
            }
            if !proto_param.is_empty() {
                put("protocol-param", Value::String(proto_param.clone()));
            }
            if !group.is_empty() {
                put("group", Value::String(group.clone()));
            }
        }
        Params::Vmess {
            uuid,
            alter_id,
            cipher,
            transport,
            tls,
            sni,
            ..
        } => {
            put("uuid", Value::String(uuid.clone()));
            put("alterId", Value::Number((*alter_id).into()));
            put("cipher", Value::String(cipher.clone()));
            put("network", Value::String(transport.clone()));
            if tls == "tls" {
                put("tls", Value::Bool(true));
            }
            if !sni.is_empty() {
                put("servername", Value::String(sni.clone()));
            }
            put("udp", Value::Bool(true));
        }
        Params::Vless { uuid, query } => {
            put("uuid", Value::String(uuid.clone()));
            for (k, v) in query {
                put(k, Value::String(v.clone()));
            }
            put("udp", Value::Bool(true));
        }
        Params::Trojan { password, query } => {
            put("password", Value::String(password.clone()));
            for (k, v) in query {
                put(k, Value::String(v.clone()));
            }
            put("udp", Value::Bool(true));
        }
    }
    Value::Mapping(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
port: 7890
proxies:
  - name: "hk-ss"
    type: ss
    server: HK.Example.com
    port: 8388
    cipher: aes-256-gcm
    password: pw1
  - name: "jp-vmess"
    type: vmess
    server: jp.example.com
    port: "443"
    uuid: 0af8d1f2
    alterId: 0
    cipher: auto
    network: ws
    tls: true
  - name: broken
    type: vmess
    server: ""
    port: 443
  - name: "de-trojan"
    type: trojan
    server: de.example.com
    port: 443
    password: t0ps3cret
    sni: de.example.com
"#;

    #[test]
    fn parses_sequence_and_counts_skips() {
        let (nodes, skipped) = parse_proxy_list(DOC).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(skipped, 1);
        assert_eq!(nodes[0].server, "hk.example.com");
        assert_eq!(nodes[1].port, 443);
        let Params::Trojan { query, .. } = &nodes[2].params else {
            panic!("wrong variant");
        };
        assert_eq!(query.get("sni").map(String::as_str), Some("de.example.com"));
    }

    #[test]
    fn rejects_documents_without_proxies() {
        assert!(parse_proxy_list("port: 7890\nmode: rule\n").is_err());
        assert!(parse_proxy_list("just a scalar").is_err());
    }

    #[test]
    fn heuristic_spots_proxy_lists() {
        assert!(looks_like_proxy_list(DOC));
        assert!(!looks_like_proxy_list("ss://abcd#x\nss://efgh#y\n"));
    }

    #[test]
    fn mapping_round_trips_through_parse() {
        let (nodes, _) = parse_proxy_list(DOC).unwrap();
        let emitted = serde_yaml::to_string(&serde_yaml::Value::Sequence(vec![to_clash_mapping(
            &nodes[0],
        )]))
        .unwrap();
        let doc = format!("proxies:\n{}", indent(&emitted));
        let (reparsed, _) = parse_proxy_list(&doc).unwrap();
        assert_eq!(reparsed[0].canonical_key(), nodes[0].canonical_key());
        assert_eq!(reparsed[0].params, nodes[0].params);
    }

    fn indent(s: &str) -> String {
        s.lines()
            .map(|l| format!("  {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
