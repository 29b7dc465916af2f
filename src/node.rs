use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Proxy protocol of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ss,
    Ssr,
    Vmess,
    Vless,
    Trojan,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ss => "ss",
            Protocol::Ssr => "ssr",
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ss" => Some(Protocol::Ss),
            "ssr" => Some(Protocol::Ssr),
            "vmess" => Some(Protocol::Vmess),
            "vless" => Some(Protocol::Vless),
            "trojan" => Some(Protocol::Trojan),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-specific parameters. Typed fields for the structured schemes,
/// verbatim query maps for the querystring schemes so unknown keys survive
/// a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Params {
    Ss {
        method: String,
        password: String,
    },
    Ssr {
        protocol: String,
        method: String,
        obfs: String,
        password: String,
        obfs_param: String,
        proto_param: String,
        group: String,
    },
    Vmess {
        uuid: String,
        alter_id: u32,
        cipher: String,
        transport: String,
        header_type: String,
        host: String,
        path: String,
        tls: String,
        sni: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, serde_json::Value>,
    },
    Vless {
        uuid: String,
        query: BTreeMap<String, String>,
    },
    Trojan {
        password: String,
        query: BTreeMap<String, String>,
    },
}

impl Params {
    pub fn protocol(&self) -> Protocol {
        match self {
            Params::Ss { .. } => Protocol::Ss,
            Params::Ssr { .. } => Protocol::Ssr,
            Params::Vmess { .. } => Protocol::Vmess,
            Params::Vless { .. } => Protocol::Vless,
            Params::Trojan { .. } => Protocol::Trojan,
        }
    }
}

/// A single parsed proxy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub params: Params,
    /// URL of the subscription this node came from.
    #[serde(default)]
    pub source: String,
    /// Measured TCP connect latency, set by the validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Node {
    pub fn protocol(&self) -> Protocol {
        self.params.protocol()
    }

    /// Deduplication key: protocol + lowercased server (IPv6 brackets
    /// stripped) + port.
    pub fn canonical_key(&self) -> String {
        let host = self
            .server
            .trim_matches(|c| c == '[' || c == ']')
            .to_ascii_lowercase();
        format!("{}|{}|{}", self.protocol(), host, self.port)
    }

    /// Server as it appears inside a URI: IPv6 literals keep brackets.
    pub fn uri_host(&self) -> String {
        if self.server.contains(':') && !self.server.starts_with('[') {
            format!("[{}]", self.server)
        } else {
            self.server.clone()
        }
    }

    /// Fallback display name for nodes without a remark.
    pub fn synthesize_name(protocol: Protocol, server: &str, port: u16) -> String {
        format!("{}-{}:{}", protocol, server, port)
    }
}
