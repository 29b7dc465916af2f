//! VMess `vmess://` URIs: base64 over a JSON object.
//!
//! `port` and `aid` appear in the wild as both strings and numbers; both are
//! accepted. Unrecognized keys are carried through verbatim so the emitted
//! form is faithful.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{Node, Params, Protocol};

use super::{decode_b64_str, CodecError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct VmessDoc {
    #[serde(default = "default_version")]
    v: String,
    #[serde(default)]
    ps: String,
    #[serde(default)]
    add: String,
    #[serde(default)]
    port: Value,
    #[serde(default)]
    id: String,
    #[serde(default)]
    aid: Value,
    #[serde(default = "default_cipher")]
    scy: String,
    #[serde(default = "default_transport")]
    net: String,
    #[serde(rename = "type", default = "default_header")]
    header_type: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    tls: String,
    #[serde(default)]
    sni: String,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

fn default_version() -> String {
    "2".into()
}
fn default_cipher() -> String {
    "auto".into()
}
fn default_transport() -> String {
    "tcp".into()
}
fn default_header() -> String {
    "none".into()
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn parse(uri: &str) -> Result<Node, CodecError> {
    let body = uri
        .strip_prefix("vmess://")
        .ok_or_else(|| CodecError::MalformedUri("not a vmess uri".into()))?;
    let json = decode_b64_str(body)?;
    let doc: VmessDoc =
        serde_json::from_str(&json).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;

    let server = doc.add.trim().to_ascii_lowercase();
    if server.is_empty() {
        return Err(CodecError::MalformedUri("empty server".into()));
    }
    let port = as_u64(&doc.port)
        .filter(|p| (1..=65535).contains(p))
        .ok_or_else(|| CodecError::MalformedUri("bad port".into()))? as u16;
    let alter_id = as_u64(&doc.aid).unwrap_or(0) as u32;

    Ok(Node {
        name: if doc.ps.is_empty() {
            Node::synthesize_name(Protocol::Vmess, &server, port)
        } else {
            doc.ps
        },
        server,
        port,
        params: Params::Vmess {
            uuid: doc.id,
            alter_id,
            cipher: doc.scy,
            transport: doc.net,
            header_type: doc.header_type,
            host: doc.host,
            path: doc.path,
            tls: doc.tls,
            sni: doc.sni,
            extra: doc.extra,
        },
        source: String::new(),
        latency_ms: None,
    })
}

pub fn format(node: &Node) -> String {
    let Params::Vmess {
        uuid,
        alter_id,
        cipher,
        transport,
        header_type,
        host,
        path,
        tls,
        sni,
        extra,
    } = &node.params
    else {
        unreachable!("vmess formatter called with non-vmess params");
    };
    let doc = VmessDoc {
        v: "2".into(),
        ps: node.name.clone(),
        add: node.server.clone(),
        port: Value::String(node.port.to_string()),
        id: uuid.clone(),
        aid: Value::String(alter_id.to_string()),
        scy: cipher.clone(),
        net: transport.clone(),
        header_type: header_type.clone(),
        host: host.clone(),
        path: path.clone(),
        tls: tls.clone(),
        sni: sni.clone(),
        extra: extra.clone(),
    };
    let json = serde_json::to_string(&doc).expect("vmess doc serializes");
    format!("vmess://{}", STANDARD_NO_PAD.encode(json))
}
