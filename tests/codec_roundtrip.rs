use std::collections::BTreeMap;

use sub_o_matic::codec::{format_uri, parse_uri};
use sub_o_matic::node::{Node, Params};

fn check_round_trip(node: &Node) {
    let uri = format_uri(node);
    let reparsed = parse_uri(&uri).unwrap_or_else(|e| panic!("reparse of {uri}: {e}"));
    assert_eq!(&reparsed, node, "round trip changed node for {uri}");
    // formatting again must be byte-stable
    assert_eq!(format_uri(&reparsed), uri);
}

#[test]
fn ss_round_trip() {
    let node = parse_uri("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@1.2.3.4:443#test").unwrap();
    assert_eq!(node.server, "1.2.3.4");
    assert_eq!(node.port, 443);
    assert_eq!(node.name, "test");
    check_round_trip(&node);
}

#[test]
fn ssr_round_trip() {
    let node = Node {
        name: "sg 01".into(),
        server: "sg.example.org".into(),
        port: 8443,
        params: Params::Ssr {
            protocol: "auth_chain_a".into(),
            method: "none".into(),
            obfs: "http_simple".into(),
            password: "p/w=+".into(),
            obfs_param: "download.windowsupdate.com".into(),
            proto_param: "65535:pwd".into(),
            group: "grp".into(),
        },
        source: String::new(),
        latency_ms: None,
    };
    check_round_trip(&node);
}

#[test]
fn vmess_round_trip() {
    let mut extra = BTreeMap::new();
    extra.insert("alpn".to_string(), serde_json::Value::String("h2".into()));
    let node = Node {
        name: "us west".into(),
        server: "us.example.org".into(),
        port: 443,
        params: Params::Vmess {
            uuid: "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d".into(),
            alter_id: 2,
            cipher: "aes-128-gcm".into(),
            transport: "ws".into(),
            header_type: "none".into(),
            host: "cdn.example.org".into(),
            path: "/ray".into(),
            tls: "tls".into(),
            sni: "cdn.example.org".into(),
            extra,
        },
        source: String::new(),
        latency_ms: None,
    };
    check_round_trip(&node);
}

#[test]
fn vless_round_trip() {
    let node = parse_uri(
        "vless://u-u-i-d@host.example:443?encryption=none&flow=xtls-rprx-vision&security=reality&sni=a.example&fp=chrome&pbk=KEY&sid=aa12&type=tcp#name%20with%20space",
    )
    .unwrap();
    assert_eq!(node.name, "name with space");
    check_round_trip(&node);
}

#[test]
fn trojan_round_trip() {
    let node = parse_uri(
        "trojan://secret@tr.example:443?sni=tr.example&alpn=h2&allowInsecure=1&peer=tr.example&type=ws&host=tr.example&path=%2Ftr#berlin",
    )
    .unwrap();
    check_round_trip(&node);
}

#[test]
fn ipv6_hosts_round_trip_in_every_scheme() {
    let ss = parse_uri(&format!(
        "ss://{}@[2001:db8::10]:8388#v6",
        // aes-256-gcm:pw
        "YWVzLTI1Ni1nY206cHc"
    ))
    .unwrap();
    assert_eq!(ss.server, "2001:db8::10");
    check_round_trip(&ss);

    let vless = parse_uri("vless://u@[2001:db8::11]:443?type=tcp#v6").unwrap();
    assert_eq!(vless.server, "2001:db8::11");
    check_round_trip(&vless);

    let trojan = parse_uri("trojan://pw@[2001:db8::12]:443#v6").unwrap();
    check_round_trip(&trojan);
}

#[test]
fn canonical_identity_ignores_case_and_brackets() {
    let a = parse_uri("trojan://pw@HOST.Example:443#a").unwrap();
    let b = parse_uri("trojan://other@host.example:443#b").unwrap();
    assert_eq!(a.canonical_key(), b.canonical_key());
}
