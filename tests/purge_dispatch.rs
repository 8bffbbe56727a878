mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use edgepurge::purge::{
    PurgeConfig, PurgeDispatcher, PurgeMethod, PurgeObserver, PurgeRecord,
    ban_url_with_any_query_string,
};
use httpmock::MockServer;

use common::start_recorder;

fn dispatcher(cache_hosts: Vec<String>) -> PurgeDispatcher {
    let config = PurgeConfig {
        cache_hosts,
        request_timeout_ms: 2000,
        connect_timeout_ms: 500,
        ..Default::default()
    };
    PurgeDispatcher::new(Arc::new(config)).expect("dispatcher")
}

fn mock_host(server: &MockServer) -> String {
    server.address().to_string()
}

#[tokio::test]
async fn purge_requests_use_purge_method_and_site_host() {
    let (addr, recorder) = start_recorder().await;
    let dispatcher = dispatcher(vec![addr.to_string()]);

    let records = dispatcher.dispatch("https://a.test/hello/?ref=feed").await;

    assert_eq!(records.len(), 1);
    assert!(records[0].is_success());
    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "PURGE");
    assert_eq!(request.path, "/hello/");
    assert_eq!(request.query.as_deref(), Some("ref=feed"));
    assert_eq!(request.host.as_deref(), Some("a.test"));
    assert_eq!(request.purge_method.as_deref(), Some("default"));
    assert_eq!(request.ban_regex, None);
}

#[tokio::test]
async fn full_purge_sends_wildcard_regex_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/.*").header("x-purge-method", "regex");
            then.status(200);
        })
        .await;

    let dispatcher = dispatcher(vec![mock_host(&server)]);
    let records = dispatcher.purge_all("https://a.test/").await;

    mock.assert_async().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target.method, PurgeMethod::Regex);
    assert_eq!(records[0].target.url, "https://a.test/?vhp-regex");
}

#[tokio::test]
async fn every_cache_host_receives_the_purge() {
    let first = MockServer::start_async().await;
    let second = MockServer::start_async().await;
    let first_mock = first
        .mock_async(|when, then| {
            when.path("/hello/").header("x-purge-method", "default");
            then.status(200);
        })
        .await;
    let second_mock = second
        .mock_async(|when, then| {
            when.path("/hello/").header("x-purge-method", "default");
            then.status(200);
        })
        .await;

    let dispatcher = dispatcher(vec![mock_host(&first), mock_host(&second)]);
    let records = dispatcher.dispatch("https://a.test/hello/").await;

    first_mock.assert_async().await;
    second_mock.assert_async().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(PurgeRecord::is_success));
}

#[tokio::test]
async fn unreachable_host_does_not_block_siblings() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/hello/");
            then.status(200);
        })
        .await;

    let dispatcher = dispatcher(vec!["127.0.0.1:1".to_string(), mock_host(&server)]);
    let records = dispatcher.dispatch("https://a.test/hello/").await;

    mock.assert_async().await;
    assert_eq!(records.len(), 2);
    let failed: Vec<&PurgeRecord> = records.iter().filter(|r| r.outcome.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target.cache_host, "127.0.0.1:1");
}

#[tokio::test]
async fn ban_regex_is_sent_as_header() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/wp-json/wp/v2/posts/")
                .header("x-purge-method", "ban-regex")
                .header("x-ban-regex", r"^/wp-json/wp/v2/posts($|/$|\?.*|/\?.*)");
            then.status(200);
        })
        .await;

    let dispatcher = dispatcher(vec![mock_host(&server)]);
    let url = ban_url_with_any_query_string("https://a.test/wp-json/wp/v2/posts/", "https://a.test");
    dispatcher.dispatch(&url).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_urls_send_nothing() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|_when, then| {
            then.status(200);
        })
        .await;

    let dispatcher = dispatcher(vec![mock_host(&server)]);
    let records = dispatcher.dispatch("::not a url").await;
    let hostless = dispatcher.dispatch("file:///etc/hosts").await;

    assert!(records.is_empty());
    assert!(hostless.is_empty());
    mock.assert_hits_async(0).await;
}

#[derive(Default)]
struct CountingObserver {
    purges: AtomicUsize,
    full_purges: AtomicUsize,
    statuses: Mutex<Vec<Option<u16>>>,
}

impl PurgeObserver for CountingObserver {
    fn after_purge(&self, record: &PurgeRecord) {
        self.purges.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .expect("statuses lock")
            .push(record.status().map(|status| status.as_u16()));
    }

    fn after_full_purge(&self, _records: &[PurgeRecord]) {
        self.full_purges.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn observers_see_every_request_and_full_purge() {
    let (first, _) = start_recorder().await;
    let (second, _) = start_recorder().await;
    let observer = Arc::new(CountingObserver::default());
    let dispatcher = dispatcher(vec![first.to_string(), second.to_string()])
        .with_observer(observer.clone());

    dispatcher.dispatch("https://a.test/x/").await;
    dispatcher.purge_all("https://a.test").await;

    assert_eq!(observer.purges.load(Ordering::SeqCst), 4);
    assert_eq!(observer.full_purges.load(Ordering::SeqCst), 1);
    assert!(
        observer
            .statuses
            .lock()
            .expect("statuses lock")
            .iter()
            .all(|status| *status == Some(200))
    );
}
