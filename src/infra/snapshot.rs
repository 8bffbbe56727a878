//! TOML-backed content model.
//!
//! A snapshot file holds the site description plus every document the purge
//! engine may be asked about:
//!
//! ```toml
//! [site]
//! home_url = "https://example.test"
//! rest_url = "https://example.test/wp-json/"
//!
//! [[documents]]
//! id = 42
//! status = "publish"
//! kind = "post"
//! permalink = "https://example.test/hello/"
//! ```

use std::{collections::HashMap, fs, path::Path};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::application::content::{ContentError, ContentModel};
use crate::domain::entities::{Document, DocumentId, FrontPage, SiteInfo};

#[derive(Debug, Deserialize)]
struct SiteSnapshot {
    site: SiteInfo,
    #[serde(default)]
    documents: Vec<Document>,
}

/// Content model answering from an in-memory snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotContentModel {
    site: SiteInfo,
    documents: HashMap<DocumentId, Document>,
}

impl SnapshotContentModel {
    /// Reads and parses a snapshot file.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let data = fs::read_to_string(path).map_err(|source| ContentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let model = Self::from_toml_str(&data)?;
        info!(
            path = %path.display(),
            documents = model.documents.len(),
            home_url = %model.site.home_url,
            "Content snapshot loaded"
        );
        Ok(model)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ContentError> {
        let snapshot: SiteSnapshot =
            toml::from_str(data).map_err(|err| ContentError::Parse(err.to_string()))?;

        let mut documents = HashMap::with_capacity(snapshot.documents.len());
        for document in snapshot.documents {
            let id = document.id;
            if documents.insert(id, document).is_some() {
                return Err(ContentError::Parse(format!("duplicate document id {id}")));
            }
        }

        Ok(Self {
            site: snapshot.site,
            documents,
        })
    }

    /// A site with no documents, for deployments that only issue manual
    /// purges.
    pub fn home_only(home_url: impl Into<String>) -> Self {
        Self {
            site: SiteInfo {
                home_url: home_url.into(),
                front_page: FrontPage::Posts,
                feed_urls: Vec::new(),
                rest_url: None,
                amp_suffix: false,
            },
            documents: HashMap::new(),
        }
    }
}

#[async_trait]
impl ContentModel for SnapshotContentModel {
    async fn document(&self, id: DocumentId) -> Result<Option<Document>, ContentError> {
        Ok(self.documents.get(&id).cloned())
    }

    async fn site(&self) -> Result<SiteInfo, ContentError> {
        Ok(self.site.clone())
    }
}
