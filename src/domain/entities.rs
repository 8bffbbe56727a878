//! Content-model records as seen by the purge engine.
//!
//! These mirror what the CMS reports about a document and the site it
//! belongs to. Links are absolute URLs already rendered by the CMS; the purge
//! engine never builds permalinks itself.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque document identifier assigned by the content model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A single content unit (post, page, attachment, custom type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Lifecycle status as reported by the CMS (`publish`, `draft`, `trash`, ...).
    pub status: String,
    /// Content type (`post`, `page`, `revision`, custom types).
    pub kind: String,
    pub permalink: String,
    #[serde(default)]
    pub trashed: bool,
    /// REST collection name registered for the content type, if any.
    #[serde(default)]
    pub rest_base: Option<String>,
    #[serde(default)]
    pub terms: Vec<TermLink>,
    #[serde(default)]
    pub author: Option<AuthorLinks>,
    #[serde(default)]
    pub type_archive: Option<ArchiveLinks>,
    #[serde(default)]
    pub comments_feed: Option<String>,
    /// Canonical AMP URL provided by an AMP plugin.
    #[serde(default)]
    pub amp_permalink: Option<String>,
}

/// Taxonomy a term belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Category,
    Tag,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermLink {
    pub taxonomy: Taxonomy,
    pub term_id: u64,
    pub slug: String,
    pub link: String,
    /// Whether the taxonomy is publicly queryable. Categories and tags are
    /// always public.
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorLinks {
    pub id: u64,
    pub posts_url: String,
    pub feed_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveLinks {
    pub link: String,
    pub feed: String,
}

/// What the site shows at its front page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontPage {
    #[default]
    Posts,
    /// A static page is shown; `posts_page` is the permalink of the page
    /// listing the latest posts, when configured.
    Page { posts_page: Option<String> },
}

/// Site-wide configuration reported by the content model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub home_url: String,
    #[serde(default)]
    pub front_page: FrontPage,
    /// Aggregate feeds (RDF, RSS, RSS2, Atom, comments).
    #[serde(default)]
    pub feed_urls: Vec<String>,
    /// Base of the REST API (`https://example.test/wp-json/`). `None` when the
    /// REST API is disabled.
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Whether an AMP plugin serving `<permalink>amp/` is active.
    #[serde(default)]
    pub amp_suffix: bool,
}
