//! Purge trigger service.
//!
//! High-level entry points used by the CLI and HTTP surfaces. Each call runs
//! one complete cycle: record, decide, dispatch.

use std::sync::Arc;

use tracing::debug;

use crate::application::content::ContentError;
use crate::domain::entities::DocumentId;

use super::cycle::{CycleReport, PurgeEngine};
use super::events::{ChangeEvent, ChangeEventKind};
use super::planner::ManualRequest;

/// Cheap-to-clone handle for triggering purge cycles.
///
/// ```ignore
/// // After a post is saved:
/// trigger.document_changed(ChangeEventKind::Saved, post_id).await?;
/// ```
#[derive(Clone)]
pub struct PurgeTrigger {
    engine: Arc<PurgeEngine>,
}

impl PurgeTrigger {
    pub fn new(engine: Arc<PurgeEngine>) -> Self {
        Self { engine }
    }

    /// Purge everything under the home URL.
    pub async fn trigger_full_purge(&self) -> Result<CycleReport, ContentError> {
        self.manual(ManualRequest::FlushAll).await
    }

    /// Purge a single URL.
    pub async fn trigger_url_purge(&self, url: &str) -> Result<CycleReport, ContentError> {
        self.manual(ManualRequest::FlushUrl(url.to_string())).await
    }

    /// Flush the CMS object cache without touching the HTTP cache.
    pub async fn trigger_object_cache_flush(&self) -> Result<CycleReport, ContentError> {
        self.manual(ManualRequest::FlushObjectCache).await
    }

    /// Record a single document change and dispatch.
    pub async fn document_changed(
        &self,
        kind: ChangeEventKind,
        document: DocumentId,
    ) -> Result<CycleReport, ContentError> {
        self.events(vec![ChangeEvent::for_document(kind, document)])
            .await
    }

    /// Record a site-wide change and dispatch.
    pub async fn site_changed(&self, kind: ChangeEventKind) -> Result<CycleReport, ContentError> {
        self.events(vec![ChangeEvent::site_wide(kind)]).await
    }

    /// Record every event in one cycle, so overlapping URLs are purged once
    /// and the full-purge threshold sees the combined set.
    pub async fn events(&self, events: Vec<ChangeEvent>) -> Result<CycleReport, ContentError> {
        let mut cycle = self.engine.begin();
        for event in events {
            cycle.record(event).await?;
        }
        cycle.finish().await
    }

    async fn manual(&self, request: ManualRequest) -> Result<CycleReport, ContentError> {
        debug!(request = ?request, "Manual purge requested");
        let mut cycle = self.engine.begin();
        cycle.request(request);
        cycle.finish().await
    }
}
