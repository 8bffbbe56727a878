#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
};

/// A request as seen by the recording cache host.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub purge_method: Option<String>,
    pub ban_regex: Option<String>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("recorder lock").clone()
    }
}

async fn record(State(recorder): State<Recorder>, request: Request) -> StatusCode {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        host: header("host"),
        purge_method: header("x-purge-method"),
        ban_regex: header("x-ban-regex"),
    };
    recorder
        .requests
        .lock()
        .expect("recorder lock")
        .push(recorded);
    StatusCode::OK
}

/// Starts a cache host stand-in that accepts any method on any path.
pub async fn start_recorder() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let router = Router::new()
        .fallback(record)
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind recorder");
    let addr = listener.local_addr().expect("recorder addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("recorder server");
    });

    (addr, recorder)
}

pub const SNAPSHOT: &str = r#"
[site]
home_url = "https://a.test"
rest_url = "https://a.test/wp-json/"
feed_urls = [
    "https://a.test/feed/rdf/",
    "https://a.test/feed/rss/",
    "https://a.test/feed/",
    "https://a.test/feed/atom/",
    "https://a.test/comments/feed/",
]

[[documents]]
id = 42
status = "publish"
kind = "post"
permalink = "https://a.test/hello/"
comments_feed = "https://a.test/hello/feed/"

[documents.author]
id = 7
posts_url = "https://a.test/author/ann/"
feed_url = "https://a.test/author/ann/feed/"

[[documents.terms]]
taxonomy = "category"
term_id = 3
slug = "news"
link = "https://a.test/category/news/"

[[documents.terms]]
taxonomy = "category"
term_id = 4
slug = "tech"
link = "https://a.test/category/tech/"

[[documents]]
id = 43
status = "publish"
kind = "page"
permalink = "https://a.test/about/"

[[documents]]
id = 44
status = "auto-draft"
kind = "post"
permalink = "https://a.test/?p=44"
"#;
