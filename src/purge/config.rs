//! Purge configuration.
//!
//! Controls cache host fan-out, full-purge threshold and URL collection rules
//! via `edgepurge.toml` (`[purge]` section).

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::entities::SiteInfo;

use super::events::EventScopeTable;
use super::target::Scheme;

// Default values for purge configuration
pub const DEFAULT_MAX_URLS_BEFORE_ALL: usize = 50;
pub const DEFAULT_REST_ROUTE: &str = "wp/v2";
pub const DEFAULT_VALID_STATUSES: [&str; 5] = ["publish", "private", "trash", "pending", "draft"];
pub const DEFAULT_INVALID_TYPES: [&str; 2] = ["nav_menu_item", "revision"];
pub const DEFAULT_NO_ARCHIVE_TYPES: [&str; 2] = ["post", "page"];
pub const DEFAULT_AUTHOR_ARCHIVE_TYPES: [&str; 1] = ["post"];
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Purge engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Cache endpoints (`host[:port]`). Empty means "use each URL's own host".
    pub cache_hosts: Vec<String>,
    /// Forced scheme for purge requests.
    pub schema: Option<Scheme>,
    /// Hostname of the machine running the engine; drives the scheme
    /// heuristic when no scheme is forced.
    pub server_hostname: Option<String>,
    /// Alternate hostnames serving the same content.
    pub mirror_domains: Vec<String>,
    /// Pending URL count at which a cycle escalates to a full purge.
    pub max_urls_before_all: usize,
    /// Overrides the home URL reported by the content model.
    pub home_url: Option<String>,
    /// REST namespace appended to the REST base (`wp/v2`).
    pub rest_route: String,
    pub valid_statuses: Vec<String>,
    pub invalid_types: Vec<String>,
    /// Content types whose type archive is never collected.
    pub no_archive_types: Vec<String>,
    /// Content types that also purge author archives and site feeds.
    pub author_archive_types: Vec<String>,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Maximum purge requests in flight at once.
    pub concurrency: usize,
    pub events: EventScopeTable,
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            cache_hosts: Vec::new(),
            schema: None,
            server_hostname: None,
            mirror_domains: Vec::new(),
            max_urls_before_all: DEFAULT_MAX_URLS_BEFORE_ALL,
            home_url: None,
            rest_route: DEFAULT_REST_ROUTE.to_string(),
            valid_statuses: owned(&DEFAULT_VALID_STATUSES),
            invalid_types: owned(&DEFAULT_INVALID_TYPES),
            no_archive_types: owned(&DEFAULT_NO_ARCHIVE_TYPES),
            author_archive_types: owned(&DEFAULT_AUTHOR_ARCHIVE_TYPES),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            events: EventScopeTable::default(),
        }
    }
}

impl From<&crate::config::PurgeSettings> for PurgeConfig {
    fn from(settings: &crate::config::PurgeSettings) -> Self {
        Self {
            cache_hosts: settings.cache_hosts.clone(),
            schema: settings.schema,
            server_hostname: settings.server_hostname.clone(),
            mirror_domains: settings.mirror_domains.clone(),
            max_urls_before_all: settings.max_urls_before_all,
            home_url: settings.home_url.clone(),
            rest_route: settings.rest_route.clone(),
            valid_statuses: settings.valid_statuses.clone(),
            invalid_types: settings.invalid_types.clone(),
            no_archive_types: settings.no_archive_types.clone(),
            author_archive_types: settings.author_archive_types.clone(),
            request_timeout_ms: settings.request_timeout_ms,
            connect_timeout_ms: settings.connect_timeout_ms,
            concurrency: settings.concurrency,
            events: settings.events.clone(),
        }
    }
}

impl PurgeConfig {
    /// Scheme used for every purge request.
    pub fn scheme(&self) -> Scheme {
        self.schema
            .unwrap_or_else(|| Scheme::for_hostname(self.server_hostname.as_deref()))
    }

    /// Home URL, preferring the configured override over the site's own.
    pub fn home_url<'a>(&'a self, site: &'a SiteInfo) -> &'a str {
        self.home_url.as_deref().unwrap_or(&site.home_url)
    }

    pub fn is_valid_status(&self, status: &str) -> bool {
        self.valid_statuses.iter().any(|valid| valid == status)
    }

    pub fn is_invalid_type(&self, kind: &str) -> bool {
        self.invalid_types.iter().any(|invalid| invalid == kind)
    }

    pub fn has_type_archive(&self, kind: &str) -> bool {
        !self.no_archive_types.iter().any(|skipped| skipped == kind)
    }

    pub fn has_author_archive(&self, kind: &str) -> bool {
        self.author_archive_types.iter().any(|eligible| eligible == kind)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the concurrency limit as NonZeroUsize, clamping to 1 if zero.
    pub fn concurrency_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.concurrency).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::FrontPage;

    fn site(home: &str) -> SiteInfo {
        SiteInfo {
            home_url: home.to_string(),
            front_page: FrontPage::Posts,
            feed_urls: Vec::new(),
            rest_url: None,
            amp_suffix: false,
        }
    }

    #[test]
    fn default_values() {
        let config = PurgeConfig::default();
        assert!(config.cache_hosts.is_empty());
        assert_eq!(config.max_urls_before_all, 50);
        assert_eq!(config.rest_route, "wp/v2");
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.concurrency, 8);
        assert!(config.is_valid_status("draft"));
        assert!(!config.is_valid_status("auto-draft"));
        assert!(config.is_invalid_type("revision"));
        assert!(!config.has_type_archive("post"));
        assert!(config.has_type_archive("product"));
        assert!(config.has_author_archive("post"));
        assert!(!config.has_author_archive("page"));
    }

    #[test]
    fn scheme_prefers_override() {
        let config = PurgeConfig {
            schema: Some(Scheme::Http),
            server_hostname: Some("dp-web-1".into()),
            ..Default::default()
        };
        assert_eq!(config.scheme(), Scheme::Http);
    }

    #[test]
    fn scheme_uses_hostname_heuristic() {
        let hosted = PurgeConfig {
            server_hostname: Some("dp-web-1".into()),
            ..Default::default()
        };
        assert_eq!(hosted.scheme(), Scheme::Https);
        assert_eq!(PurgeConfig::default().scheme(), Scheme::Http);
    }

    #[test]
    fn home_url_override_wins() {
        let config = PurgeConfig {
            home_url: Some("https://cdn.test".into()),
            ..Default::default()
        };
        assert_eq!(config.home_url(&site("https://a.test")), "https://cdn.test");
        assert_eq!(
            PurgeConfig::default().home_url(&site("https://a.test")),
            "https://a.test"
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = PurgeConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.concurrency_non_zero().get(), 1);
    }

    #[test]
    fn split_list_trims_and_skips_blanks() {
        assert_eq!(
            split_list(" 10.0.0.1:6081, ,cache.test "),
            vec!["10.0.0.1:6081".to_string(), "cache.test".to_string()]
        );
    }
}
