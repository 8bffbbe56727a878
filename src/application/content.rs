//! Content-model port consumed by the purge engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{Document, DocumentId, SiteInfo};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read content snapshot `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid content snapshot: {0}")]
    Parse(String),
}

/// Read-only view of the CMS content model.
#[async_trait]
pub trait ContentModel: Send + Sync {
    /// Look up a document. `Ok(None)` means the document does not exist.
    async fn document(&self, id: DocumentId) -> Result<Option<Document>, ContentError>;

    async fn site(&self) -> Result<SiteInfo, ContentError>;
}
