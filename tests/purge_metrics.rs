mod common;

use std::collections::HashSet;
use std::sync::Arc;

use edgepurge::purge::{PurgeConfig, PurgeDispatcher};
use metrics_util::debugging::DebuggingRecorder;

use common::start_recorder;

#[tokio::test]
async fn dispatch_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let (addr, _requests) = start_recorder().await;
    let config = PurgeConfig {
        cache_hosts: vec![addr.to_string(), "127.0.0.1:1".to_string()],
        connect_timeout_ms: 500,
        ..Default::default()
    };
    let dispatcher = PurgeDispatcher::new(Arc::new(config)).expect("dispatcher");

    dispatcher
        .dispatch_many(["https://a.test/hello/", "https://a.test/feed/"])
        .await;
    dispatcher.purge_all("https://a.test/").await;

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "edgepurge_purge_requests_total",
        "edgepurge_full_purges_total",
        "edgepurge_dispatch_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == "edgepurge_purge_requests_total"
        })
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "outcome")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(outcomes.contains("success"), "outcomes: {outcomes:?}");
    assert!(outcomes.len() >= 2, "outcomes: {outcomes:?}");
}
