//! Request-scoped purge cycles.
//!
//! A cycle accumulates URLs while a request records change events, then
//! decides and dispatches exactly once. `finish` consumes the cycle, so a
//! pending set can never leak into the next request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::content::{ContentError, ContentModel};
use crate::domain::entities::SiteInfo;

use super::collector::UrlCollector;
use super::config::PurgeConfig;
use super::dispatcher::{DispatchError, PurgeDispatcher, PurgeRecord};
use super::events::{ChangeEvent, EventScope};
use super::hooks::{HeaderFilter, NoObjectCache, ObjectCache, PurgeObserver, UrlSetFilter};
use super::normalize::{PurgeSet, normalize};
use super::planner::{ManualRequest, PurgeAction, PurgeActionKind, decide};
use super::target::PurgeMethod;
use super::url::{PurgeUrl, wildcard_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Collecting,
    Deciding,
    Dispatching,
}

/// Long-lived purge machinery shared by every cycle.
pub struct PurgeEngine {
    config: Arc<PurgeConfig>,
    content: Arc<dyn ContentModel>,
    collector: UrlCollector,
    dispatcher: PurgeDispatcher,
    object_cache: Arc<dyn ObjectCache>,
}

impl PurgeEngine {
    pub fn new(
        config: Arc<PurgeConfig>,
        content: Arc<dyn ContentModel>,
    ) -> Result<Self, DispatchError> {
        let dispatcher = PurgeDispatcher::new(config.clone())?;
        let collector = UrlCollector::new(content.clone(), config.clone());
        Ok(Self {
            config,
            content,
            collector,
            dispatcher,
            object_cache: Arc::new(NoObjectCache),
        })
    }

    pub fn with_url_filter(mut self, filter: Arc<dyn UrlSetFilter>) -> Self {
        self.collector = self.collector.with_filter(filter);
        self
    }

    pub fn with_header_filter(mut self, filter: Arc<dyn HeaderFilter>) -> Self {
        self.dispatcher = self.dispatcher.with_header_filter(filter);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PurgeObserver>) -> Self {
        self.dispatcher = self.dispatcher.with_observer(observer);
        self
    }

    pub fn with_object_cache(mut self, object_cache: Arc<dyn ObjectCache>) -> Self {
        self.object_cache = object_cache;
        self
    }

    /// Home URL used for full purges and mirror expansion.
    pub async fn home_url(&self) -> Result<String, ContentError> {
        if let Some(home) = &self.config.home_url {
            return Ok(home.clone());
        }
        Ok(self.content.site().await?.home_url)
    }

    /// Starts an empty cycle.
    pub fn begin(&self) -> PurgeCycle<'_> {
        PurgeCycle {
            engine: self,
            state: CycleState::Idle,
            set: PurgeSet::new(),
            manual: None,
            events: 0,
        }
    }
}

/// One request's worth of pending purges.
pub struct PurgeCycle<'a> {
    engine: &'a PurgeEngine,
    state: CycleState,
    set: PurgeSet,
    manual: Option<ManualRequest>,
    events: usize,
}

impl PurgeCycle<'_> {
    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.set.len()
    }

    pub fn urls(&self) -> impl Iterator<Item = &PurgeUrl> {
        self.set.iter()
    }

    /// Records a change event, adding its URLs to the pending set. Returns
    /// the number of URLs newly added.
    pub async fn record(&mut self, event: ChangeEvent) -> Result<usize, ContentError> {
        self.transition(CycleState::Collecting);
        self.events += 1;

        let scope = self.engine.config.events.scope(event.kind);
        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            occurred_at = %event.timestamp,
            document = ?event.document,
            scope = ?scope,
            "Purge event recorded"
        );

        let site = self.engine.content.site().await?;
        let home = self.engine.config.home_url(&site).to_string();
        let collected = match (scope, event.document) {
            (EventScope::FullPurge, _) => vec![wildcard_url(&home)],
            (EventScope::Document, Some(id)) => {
                self.engine.collector.collect_with_site(id, &site).await?
            }
            (EventScope::Document, None) => {
                warn!(event_id = %event.id, event_kind = %event.kind, "Document event without document id ignored");
                Vec::new()
            }
        };

        Ok(self.add(collected, &home))
    }

    /// Adds URLs that did not come from a change event.
    pub async fn add_urls<I>(&mut self, urls: I) -> Result<usize, ContentError>
    where
        I: IntoIterator<Item = String>,
    {
        self.transition(CycleState::Collecting);
        let site: SiteInfo = self.engine.content.site().await?;
        let home = self.engine.config.home_url(&site).to_string();
        Ok(self.add(urls, &home))
    }

    fn add<I>(&mut self, urls: I, home: &str) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.set.len();
        self.set.extend(normalize(urls, home, &self.engine.config));
        self.set.len() - before
    }

    /// Registers a manual request. Only the latest one is kept, and it only
    /// applies when no URLs are pending at the end of the cycle.
    pub fn request(&mut self, manual: ManualRequest) {
        if let Some(previous) = &self.manual {
            debug!(previous = ?previous, next = ?manual, "Replacing manual purge request");
        }
        self.manual = Some(manual);
    }

    /// Decides and dispatches the cycle's action.
    pub async fn finish(mut self) -> Result<CycleReport, ContentError> {
        self.transition(CycleState::Deciding);
        let urls = self.set.drain();
        let url_count = urls.len();
        let action = decide(
            urls,
            self.manual.as_ref(),
            self.engine.config.max_urls_before_all,
        );
        info!(
            action = %action,
            events = self.events,
            pending = url_count,
            "Purge cycle decided"
        );

        self.transition(CycleState::Dispatching);
        let mut report = CycleReport {
            action: action.kind(),
            urls: url_count,
            records: Vec::new(),
            object_cache_flushed: None,
        };

        match action {
            PurgeAction::Noop => {}
            PurgeAction::PurgeEach(urls) => {
                report.urls = urls.len();
                report.records = self
                    .engine
                    .dispatcher
                    .dispatch_many(urls.iter().map(PurgeUrl::as_str))
                    .await;
            }
            PurgeAction::PurgeAll => {
                let home = self.engine.home_url().await?;
                report.records = self.engine.dispatcher.purge_all(&home).await;
            }
            PurgeAction::FlushObjectCache => {
                let flushed = match self.engine.object_cache.flush().await {
                    Ok(flushed) => flushed,
                    Err(err) => {
                        warn!(error = %err, "Object cache flush failed");
                        false
                    }
                };
                report.object_cache_flushed = Some(flushed);
            }
        }

        self.transition(CycleState::Idle);
        Ok(report)
    }

    fn transition(&mut self, next: CycleState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Purge cycle state changed");
            self.state = next;
        }
    }
}

/// What a finished cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub action: PurgeActionKind,
    /// URLs pending when the cycle was decided.
    pub urls: usize,
    pub records: Vec<PurgeRecord>,
    pub object_cache_flushed: Option<bool>,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.records.iter().filter(|record| !record.is_success()).count()
    }

    pub fn summary(&self) -> PurgeSummary {
        PurgeSummary {
            action: self.action,
            urls: self.urls,
            requests: self.records.len(),
            failed: self.failed(),
            object_cache_flushed: self.object_cache_flushed,
            results: self.records.iter().map(RequestSummary::from).collect(),
        }
    }
}

/// Serializable view of a [`CycleReport`].
#[derive(Debug, Clone, Serialize)]
pub struct PurgeSummary {
    pub action: PurgeActionKind,
    pub urls: usize,
    pub requests: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_cache_flushed: Option<bool>,
    pub results: Vec<RequestSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub url: String,
    pub purge_url: String,
    pub cache_host: String,
    pub method: PurgeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PurgeRecord> for RequestSummary {
    fn from(record: &PurgeRecord) -> Self {
        Self {
            url: record.target.url.clone(),
            purge_url: record.target.purge_url.clone(),
            cache_host: record.target.cache_host.clone(),
            method: record.target.method,
            status: record.status().map(|status| status.as_u16()),
            error: record.outcome.as_ref().err().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::entities::{Document, DocumentId, FrontPage};
    use crate::purge::events::{ChangeEventKind, EventScopeTable};
    use crate::purge::hooks::ObjectCacheError;

    struct Site;

    #[async_trait]
    impl ContentModel for Site {
        async fn document(&self, id: DocumentId) -> Result<Option<Document>, ContentError> {
            Ok(Some(Document {
                id,
                status: "publish".into(),
                kind: "page".into(),
                permalink: format!("https://a.test/p/{id}/"),
                trashed: false,
                rest_base: None,
                terms: Vec::new(),
                author: None,
                type_archive: None,
                comments_feed: None,
                amp_permalink: None,
            }))
        }

        async fn site(&self) -> Result<SiteInfo, ContentError> {
            Ok(SiteInfo {
                home_url: "https://a.test".into(),
                front_page: FrontPage::Posts,
                feed_urls: Vec::new(),
                rest_url: None,
                amp_suffix: false,
            })
        }
    }

    struct CountingCache;

    #[async_trait]
    impl ObjectCache for CountingCache {
        async fn flush(&self) -> Result<bool, ObjectCacheError> {
            Ok(true)
        }
    }

    fn engine(config: PurgeConfig) -> PurgeEngine {
        PurgeEngine::new(Arc::new(config), Arc::new(Site)).expect("engine")
    }

    #[tokio::test]
    async fn new_cycle_is_idle_and_empty() {
        let engine = engine(PurgeConfig::default());
        let cycle = engine.begin();
        assert_eq!(cycle.state(), CycleState::Idle);
        assert_eq!(cycle.pending(), 0);
    }

    #[tokio::test]
    async fn recording_collects_document_urls() {
        let engine = engine(PurgeConfig::default());
        let mut cycle = engine.begin();
        let added = cycle
            .record(ChangeEvent::for_document(ChangeEventKind::Saved, DocumentId(5)))
            .await
            .expect("record");
        assert_eq!(cycle.state(), CycleState::Collecting);
        assert_eq!(added, 2);

        let again = cycle
            .record(ChangeEvent::for_document(ChangeEventKind::Edited, DocumentId(5)))
            .await
            .expect("record");
        assert_eq!(again, 0);
        assert_eq!(cycle.pending(), 2);
    }

    #[tokio::test]
    async fn full_scope_events_queue_wildcard() {
        let engine = engine(PurgeConfig::default());
        let mut cycle = engine.begin();
        cycle
            .record(ChangeEvent::site_wide(ChangeEventKind::ThemeSwitched))
            .await
            .expect("record");
        let urls: Vec<&str> = cycle.urls().map(PurgeUrl::as_str).collect();
        assert_eq!(urls, vec!["https://a.test/?vhp-regex"]);
    }

    #[tokio::test]
    async fn overridden_scope_escalates_document_event() {
        let config = PurgeConfig {
            events: EventScopeTable::default()
                .with_override(ChangeEventKind::Deleted, EventScope::FullPurge),
            ..Default::default()
        };
        let engine = engine(config);
        let mut cycle = engine.begin();
        cycle
            .record(ChangeEvent::for_document(ChangeEventKind::Deleted, DocumentId(9)))
            .await
            .expect("record");
        assert_eq!(cycle.pending(), 1);
    }

    #[tokio::test]
    async fn document_event_without_id_is_ignored() {
        let engine = engine(PurgeConfig::default());
        let mut cycle = engine.begin();
        let added = cycle
            .record(ChangeEvent::new(ChangeEventKind::Saved, None))
            .await
            .expect("record");
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn empty_cycle_finishes_as_noop() {
        let engine = engine(PurgeConfig::default());
        let report = engine.begin().finish().await.expect("finish");
        assert_eq!(report.action, PurgeActionKind::Noop);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn object_cache_request_flushes_cache() {
        let engine = engine(PurgeConfig::default()).with_object_cache(Arc::new(CountingCache));
        let mut cycle = engine.begin();
        cycle.request(ManualRequest::FlushObjectCache);
        let report = cycle.finish().await.expect("finish");
        assert_eq!(report.action, PurgeActionKind::FlushObjectCache);
        assert_eq!(report.object_cache_flushed, Some(true));
    }

    #[tokio::test]
    async fn pending_urls_override_manual_request() {
        let engine = engine(PurgeConfig {
            cache_hosts: vec!["127.0.0.1:9".into()],
            request_timeout_ms: 200,
            connect_timeout_ms: 200,
            ..Default::default()
        });
        let mut cycle = engine.begin();
        cycle.request(ManualRequest::FlushObjectCache);
        cycle
            .add_urls(vec!["https://a.test/only/".to_string()])
            .await
            .expect("add");
        let report = cycle.finish().await.expect("finish");
        assert_eq!(report.action, PurgeActionKind::PurgeEach);
        assert_eq!(report.object_cache_flushed, None);
        assert_eq!(report.records.len(), 1);
    }
}
