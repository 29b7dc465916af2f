//! End-to-end exercises of the run pipeline components against local
//! listeners and a mock subscription host.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sub_o_matic::cancel::cancel_pair;
use sub_o_matic::emit::{emit, ClashWriter};
use sub_o_matic::fetch::Fetcher;
use sub_o_matic::ingest::ingest;
use sub_o_matic::probe::validate;
use sub_o_matic::score::{compute_score, tier_of, Tier};
use sub_o_matic::select::select;
use sub_o_matic::settings::Settings;
use sub_o_matic::store::{HistoryEntry, Store};

fn test_settings() -> Settings {
    Settings {
        batch_delay_s: 0.0,
        ..Settings::default()
    }
}

#[tokio::test]
async fn fetch_ingest_validate_emit_chain() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    // one reachable SS node, one refused trojan node, base64-wrapped body
    let body = STANDARD.encode(format!(
        "ss://{}@127.0.0.1:{}#alive\ntrojan://pw@127.0.0.1:{}#dead\n",
        STANDARD.encode("aes-256-gcm:password"),
        open_port,
        closed_port,
    ));
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sub"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let settings = test_settings();
    let (_src, cancel) = cancel_pair();
    let url = format!("{}/sub", server.uri());

    let fetched = Fetcher::new(&settings)
        .unwrap()
        .fetch_all(&[url.clone()], &cancel)
        .await;
    assert!(fetched[0].ok());

    let ingested = ingest(&fetched);
    assert_eq!(ingested.nodes.len(), 2);
    assert_eq!(ingested.nodes[0].source, url);

    let validated = validate(ingested.nodes, &settings, &cancel).await;
    assert_eq!(validated.report.total_nodes, 2);
    assert_eq!(validated.report.valid_nodes, 1);
    assert_eq!(validated.ranked.len(), 1);
    assert_eq!(validated.ranked[0].name, "alive");
    assert!(validated.ranked[0].latency_ms.is_some());

    let out = tempfile::tempdir().unwrap();
    emit(&validated.ranked, &validated.report, &ClashWriter::new(out.path())).unwrap();

    let stats: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("validation_stats.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(stats["total_nodes"], 2);
    assert_eq!(stats["valid_nodes"], 1);
    assert_eq!(stats["per_subscription"][&url]["total"], 2);

    let uris = std::fs::read_to_string(out.path().join("nodes.txt")).unwrap();
    assert_eq!(uris.lines().count(), 1);
    assert!(uris.starts_with("ss://"));
}

#[tokio::test]
async fn all_probes_failing_still_produces_placeholders() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let nodes = {
        let fetched = vec![sub_o_matic::fetch::FetchResult {
            url: "https://sub.example/x".into(),
            body: Some(format!(
                "trojan://pw@127.0.0.1:{closed_port}#a\nvless://u@127.0.0.1:{closed_port}?type=tcp#b\n"
            )),
            error: None,
            elapsed_ms: 5,
        }];
        ingest(&fetched).nodes
    };
    // same canonical host/port but distinct protocols: both survive dedup
    assert_eq!(nodes.len(), 2);

    let (_src, cancel) = cancel_pair();
    let validated = validate(nodes, &test_settings(), &cancel).await;
    assert_eq!(validated.report.valid_nodes, 0);

    let out = tempfile::tempdir().unwrap();
    emit(&validated.ranked, &validated.report, &ClashWriter::new(out.path())).unwrap();
    for artifact in ["clash.yml", "clash_mini.yml", "nodes.txt", "nodes_mini.txt", "validation_stats.json"] {
        assert!(out.path().join(artifact).exists(), "{artifact} missing");
    }
    let cfg: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(out.path().join("clash.yml")).unwrap())
            .unwrap();
    assert!(cfg["proxies"].as_sequence().unwrap().is_empty());
}

#[test]
fn new_subscription_is_protected_for_three_runs_then_scored() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://fresh.example/sub".to_string();

    for run in 1..=4u64 {
        let mut store = Store::open(dir.path());
        let run_number = store.begin_run();
        assert_eq!(run_number, run);
        let states = store.upsert_subscriptions(std::slice::from_ref(&url));
        let selected = select(&states, run_number, 99);

        if run <= 3 {
            assert_eq!(selected.len(), 1, "run {run} must select the protected sub");
        } else {
            // protection exhausted; the dreadful history below suspends it
            assert!(selected.is_empty(), "run {run} should drop the suspended sub");
            break;
        }

        let mut state = selected.into_iter().next().unwrap();
        state.push_history(HistoryEntry {
            timestamp: run as i64,
            total_nodes: 10,
            valid_nodes: 0,
            avg_latency_ms: 0.0,
            fetch_ok: false,
        });
        state.score = compute_score(&state.history, &Settings::default());
        state.tier = tier_of(state.score);
        store.apply(state);
        store.persist().unwrap();
    }

    let store = Store::open(dir.path());
    let state = &store.subscriptions()[0];
    assert_eq!(state.protection_counter, 0);
    assert_eq!(state.tier, Tier::Suspended);
    assert_eq!(state.use_count, 3);
}

#[test]
fn store_round_trip_preserves_scored_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::open(dir.path());
    let urls: Vec<String> = vec![
        "https://b.example/sub".into(),
        "https://a.example/sub".into(),
    ];
    let mut states = store.upsert_subscriptions(&urls);
    for (i, s) in states.iter_mut().enumerate() {
        s.push_history(HistoryEntry {
            timestamp: 1_700_000_000 + i as i64,
            total_nodes: 10,
            valid_nodes: 10,
            avg_latency_ms: 300.0,
            fetch_ok: true,
        });
        s.score = compute_score(&s.history, &Settings::default());
        s.tier = tier_of(s.score);
        store.apply(s.clone());
    }
    store.persist().unwrap();

    let reloaded = Store::open(dir.path());
    let mut expected = states;
    expected.sort_by(|a, b| a.url.cmp(&b.url));
    assert_eq!(reloaded.subscriptions(), expected);
    assert_eq!(reloaded.run_number(), 0);

    // persisted file is keyed alphabetically by URL for minimal diffs
    let raw = std::fs::read_to_string(dir.path().join("subscriptions.json")).unwrap();
    let a_pos = raw.find("a.example").unwrap();
    let b_pos = raw.find("b.example").unwrap();
    assert!(a_pos < b_pos);
}

#[tokio::test]
async fn cancellation_mid_run_marks_rest_cancelled_and_writes_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let nodes: Vec<_> = (0..5)
        .map(|i| {
            sub_o_matic::codec::parse_uri(&format!(
                "vless://u{i}@127.0.0.1:{port}?type=tcp#n{i}"
            ))
            .unwrap()
        })
        .collect();

    let (src, cancel) = cancel_pair();
    src.cancel();
    let validated = validate(nodes, &test_settings(), &cancel).await;
    assert!(validated.report.cancelled);
    assert_eq!(validated.report.failure_counts.get("cancelled"), Some(&5));

    // the pipeline skips persistence on cancellation; nothing to flush here
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    assert!(store.subscriptions().is_empty());
}
