//! Extension points around URL collection and dispatch.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::Document;

use super::dispatcher::PurgeRecord;

/// Adjusts the URLs collected for a document before normalization.
pub trait UrlSetFilter: Send + Sync {
    fn filter(&self, document: &Document, urls: Vec<String>) -> Vec<String>;
}

/// Adjusts the headers of each purge request before it is sent.
pub trait HeaderFilter: Send + Sync {
    fn apply(&self, purge_url: &str, headers: &mut HeaderMap);
}

/// Notified after each purge request and after every full purge.
pub trait PurgeObserver: Send + Sync {
    fn after_purge(&self, record: &PurgeRecord);

    fn after_full_purge(&self, _records: &[PurgeRecord]) {}
}

/// Logs every purge outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PurgeObserver for TracingObserver {
    fn after_purge(&self, record: &PurgeRecord) {
        match &record.outcome {
            Ok(status) => debug!(
                url = %record.target.url,
                purge_url = %record.target.purge_url,
                cache_host = %record.target.cache_host,
                method = %record.target.method,
                status = status.as_u16(),
                "Purge request completed"
            ),
            Err(err) => warn!(
                url = %record.target.url,
                purge_url = %record.target.purge_url,
                cache_host = %record.target.cache_host,
                error = %err,
                "Purge request failed"
            ),
        }
    }

    fn after_full_purge(&self, records: &[PurgeRecord]) {
        let failed = records.iter().filter(|record| !record.is_success()).count();
        info!(requests = records.len(), failed, "Full purge dispatched");
    }
}

#[derive(Debug, Error)]
#[error("object cache flush failed: {0}")]
pub struct ObjectCacheError(pub String);

/// The CMS's in-process object cache.
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Flushes the cache. Returns false when there was nothing to flush.
    async fn flush(&self) -> Result<bool, ObjectCacheError>;
}

/// Used when no object cache is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObjectCache;

#[async_trait]
impl ObjectCache for NoObjectCache {
    async fn flush(&self) -> Result<bool, ObjectCacheError> {
        Ok(false)
    }
}
