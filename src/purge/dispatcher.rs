//! Purge request dispatch.
//!
//! Sends `PURGE` requests to every cache host with bounded concurrency. A
//! failing host never prevents the remaining requests from being sent.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{info, instrument};

use super::config::PurgeConfig;
use super::hooks::{HeaderFilter, PurgeObserver, TracingObserver};
use super::target::{PurgeTarget, resolve_targets};
use super::url::wildcard_url;

pub const PURGE_METHOD: &[u8] = b"PURGE";

pub(crate) const METRIC_PURGE_REQUESTS: &str = "edgepurge_purge_requests_total";
pub(crate) const METRIC_DISPATCH_MS: &str = "edgepurge_dispatch_ms";
pub(crate) const METRIC_FULL_PURGES: &str = "edgepurge_full_purges_total";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to build purge client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid purge method: {0}")]
    Method(String),
    #[error("purge request to `{purge_url}` failed: {source}")]
    Transport {
        purge_url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Outcome of one purge request.
#[derive(Debug)]
pub struct PurgeRecord {
    pub target: PurgeTarget,
    pub outcome: Result<StatusCode, DispatchError>,
}

impl PurgeRecord {
    pub fn status(&self) -> Option<StatusCode> {
        self.outcome.as_ref().ok().copied()
    }

    /// True when the cache answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status().is_some_and(|status| status.is_success())
    }

    fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            Ok(status) if status.is_success() => "success",
            Ok(_) => "rejected",
            Err(_) => "error",
        }
    }
}

/// Sends purge requests for resolved targets.
#[derive(Clone)]
pub struct PurgeDispatcher {
    client: Client,
    method: Method,
    config: Arc<PurgeConfig>,
    header_filters: Vec<Arc<dyn HeaderFilter>>,
    observers: Vec<Arc<dyn PurgeObserver>>,
}

impl PurgeDispatcher {
    /// Builds a dispatcher with TLS verification disabled, since cache hosts
    /// are usually addressed by IP.
    pub fn new(config: Arc<PurgeConfig>) -> Result<Self, DispatchError> {
        let method = Method::from_bytes(PURGE_METHOD)
            .map_err(|err| DispatchError::Method(err.to_string()))?;
        let client = Client::builder()
            .user_agent(concat!("edgepurge/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(true)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(DispatchError::Client)?;

        Ok(Self {
            client,
            method,
            config,
            header_filters: Vec::new(),
            observers: vec![Arc::new(TracingObserver)],
        })
    }

    pub fn with_header_filter(mut self, filter: Arc<dyn HeaderFilter>) -> Self {
        self.header_filters.push(filter);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PurgeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Resolves `url` into per-host targets with header filters applied.
    pub fn targets(&self, url: &str) -> Vec<PurgeTarget> {
        let mut targets = resolve_targets(url, &self.config);
        for target in &mut targets {
            for filter in &self.header_filters {
                filter.apply(&target.purge_url, &mut target.headers);
            }
        }
        targets
    }

    /// Purges a single URL on every cache host.
    pub async fn dispatch(&self, url: &str) -> Vec<PurgeRecord> {
        self.dispatch_many([url]).await
    }

    /// Purges each URL on every cache host. Records come back in completion
    /// order.
    #[instrument(skip_all)]
    pub async fn dispatch_many<'a, I>(&self, urls: I) -> Vec<PurgeRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let targets: Vec<PurgeTarget> = urls.into_iter().flat_map(|url| self.targets(url)).collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let started_at = Instant::now();
        let target_count = targets.len();
        let records: Vec<PurgeRecord> = stream::iter(targets)
            .map(|target| self.send(target))
            .buffer_unordered(self.config.concurrency_non_zero().get())
            .collect()
            .await;

        histogram!(METRIC_DISPATCH_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            targets = target_count,
            failed = records.iter().filter(|record| !record.is_success()).count(),
            "Purge dispatch complete"
        );

        records
    }

    /// Purges everything under `home_url` on every cache host.
    pub async fn purge_all(&self, home_url: &str) -> Vec<PurgeRecord> {
        let records = self.dispatch(&wildcard_url(home_url)).await;
        counter!(METRIC_FULL_PURGES).increment(1);
        for observer in &self.observers {
            observer.after_full_purge(&records);
        }
        records
    }

    async fn send(&self, target: PurgeTarget) -> PurgeRecord {
        let result = self
            .client
            .request(self.method.clone(), target.purge_url.as_str())
            .headers(target.headers.clone())
            .timeout(self.config.request_timeout())
            .send()
            .await;

        let outcome = match result {
            Ok(response) => Ok(response.status()),
            Err(source) => Err(DispatchError::Transport {
                purge_url: target.purge_url.clone(),
                source,
            }),
        };
        let record = PurgeRecord { target, outcome };

        counter!(METRIC_PURGE_REQUESTS, "outcome" => record.outcome_label()).increment(1);
        for observer in &self.observers {
            observer.after_purge(&record);
        }

        record
    }
}
