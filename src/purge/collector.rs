//! URL collection for a changed document.
//!
//! Works out every public URL whose cached rendering may include the
//! document: its permalink, REST representations, taxonomy and author
//! archives, feeds and the home page.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::content::{ContentError, ContentModel};
use crate::domain::entities::{Document, DocumentId, FrontPage, SiteInfo, Taxonomy};

use super::config::PurgeConfig;
use super::hooks::UrlSetFilter;
use super::url::trailingslashit;

/// Slug suffix the CMS appends to trashed documents.
const TRASHED_SUFFIX: &str = "__trashed";
const TRASH_STATUS: &str = "trash";

/// URLs collected for one document, grouped by where they come from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UrlGroups {
    pub permalink: Vec<String>,
    pub rest_endpoints: Vec<String>,
    pub taxonomies: Vec<String>,
    pub author_archives: Vec<String>,
    pub feeds: Vec<String>,
    pub post_archives: Vec<String>,
    pub posts_pages: Vec<String>,
}

impl UrlGroups {
    pub fn len(&self) -> usize {
        self.permalink.len()
            + self.rest_endpoints.len()
            + self.taxonomies.len()
            + self.author_archives.len()
            + self.feeds.len()
            + self.post_archives.len()
            + self.posts_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All URLs in group order, skipping empty strings.
    pub fn flatten(self) -> Vec<String> {
        [
            self.permalink,
            self.rest_endpoints,
            self.taxonomies,
            self.author_archives,
            self.feeds,
            self.post_archives,
            self.posts_pages,
        ]
        .into_iter()
        .flatten()
        .filter(|url| !url.is_empty())
        .collect()
    }
}

/// Collects purge URLs for documents from the content model.
#[derive(Clone)]
pub struct UrlCollector {
    content: Arc<dyn ContentModel>,
    config: Arc<PurgeConfig>,
    filters: Vec<Arc<dyn UrlSetFilter>>,
}

impl UrlCollector {
    pub fn new(content: Arc<dyn ContentModel>, config: Arc<PurgeConfig>) -> Self {
        Self {
            content,
            config,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn UrlSetFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Collects the URLs for `id`. Missing documents and documents in an
    /// unpurgeable state yield an empty list.
    pub async fn collect(&self, id: DocumentId) -> Result<Vec<String>, ContentError> {
        let site = self.content.site().await?;
        self.collect_with_site(id, &site).await
    }

    #[instrument(skip(self, site))]
    pub async fn collect_with_site(
        &self,
        id: DocumentId,
        site: &SiteInfo,
    ) -> Result<Vec<String>, ContentError> {
        let Some(document) = self.content.document(id).await? else {
            debug!(document = %id, "Document not found; nothing to collect");
            return Ok(Vec::new());
        };
        if !self.is_purgeable(&document) {
            debug!(
                document = %id,
                status = %document.status,
                kind = %document.kind,
                "Document not purgeable"
            );
            return Ok(Vec::new());
        }

        let mut urls = self.groups(&document, site).flatten();
        for filter in &self.filters {
            urls = filter.filter(&document, urls);
        }
        debug!(document = %id, urls = urls.len(), "Collected purge urls");
        Ok(urls)
    }

    pub fn is_purgeable(&self, document: &Document) -> bool {
        self.config.is_valid_status(&document.status) && !self.config.is_invalid_type(&document.kind)
    }

    /// Builds the grouped URL list for a document already known to be
    /// purgeable.
    pub fn groups(&self, document: &Document, site: &SiteInfo) -> UrlGroups {
        let mut groups = UrlGroups {
            permalink: self.permalink_urls(document, site),
            ..UrlGroups::default()
        };

        if let Some(rest_base) = rest_base(document) {
            groups.rest_endpoints.extend(self.rest_url(site, &format!("{rest_base}/{}", document.id)));
            groups.rest_endpoints.extend(self.rest_url(site, &rest_base));
        }

        for term in &document.terms {
            let route = match &term.taxonomy {
                Taxonomy::Category => format!("categories/{}", term.term_id),
                Taxonomy::Tag => format!("tags/{}", term.term_id),
                Taxonomy::Custom(name) if term.public => format!("{name}/{}", term.slug),
                Taxonomy::Custom(_) => continue,
            };
            groups.taxonomies.push(term.link.clone());
            groups.taxonomies.extend(self.rest_url(site, &route));
        }

        let regular_post = self.config.has_author_archive(&document.kind);
        if regular_post {
            if let Some(author) = &document.author {
                groups.author_archives.push(author.posts_url.clone());
                groups.author_archives.push(author.feed_url.clone());
                groups
                    .author_archives
                    .extend(self.rest_url(site, &format!("users/{}", author.id)));
            }
            groups.feeds.extend(site.feed_urls.iter().cloned());
            groups.feeds.extend(document.comments_feed.iter().cloned());
        }

        if self.config.has_type_archive(&document.kind)
            && let Some(archive) = &document.type_archive
        {
            groups.post_archives.push(archive.link.clone());
            groups.post_archives.push(archive.feed.clone());
        }

        groups
            .posts_pages
            .push(trailingslashit(self.config.home_url(site)));
        if let FrontPage::Page {
            posts_page: Some(posts_page),
        } = &site.front_page
        {
            groups.posts_pages.push(posts_page.clone());
        }

        groups
    }

    fn permalink_urls(&self, document: &Document, site: &SiteInfo) -> Vec<String> {
        let mut urls = vec![document.permalink.clone()];

        if document.trashed || document.status == TRASH_STATUS {
            let previous = document.permalink.replace(TRASHED_SUFFIX, "");
            let previous_feed = trailingslashit(&format!("{previous}feed/"));
            if previous != document.permalink {
                urls.push(previous);
            }
            urls.push(previous_feed);
        }

        if let Some(amp) = &document.amp_permalink {
            urls.push(amp.clone());
        }
        if site.amp_suffix {
            urls.push(format!("{}amp/", trailingslashit(&document.permalink)));
        }

        urls
    }

    /// `<rest base>/<route>/<path>/`, or `None` when the REST API is off.
    fn rest_url(&self, site: &SiteInfo, path: &str) -> Option<String> {
        let base = site.rest_url.as_deref()?;
        Some(format!(
            "{}/{}/{}/",
            base.trim_end_matches('/'),
            self.config.rest_route.trim_matches('/'),
            path.trim_matches('/')
        ))
    }
}

fn rest_base(document: &Document) -> Option<String> {
    if let Some(base) = &document.rest_base {
        return Some(base.clone());
    }
    match document.kind.as_str() {
        "post" => Some("posts".to_string()),
        "page" => Some("pages".to_string()),
        "attachment" => Some("media".to_string()),
        _ => None,
    }
}
