//! Purge URL values and the reserved query markers understood by cache VCLs.

use std::fmt;
use std::hash::{Hash, Hasher};

use url::{Url, form_urlencoded};

/// Query marker requesting a wildcard (`.*`) purge of the URL's path.
pub const REGEX_MARKER: &str = "vhp-regex";
/// Query marker carrying a URL-encoded ban regex sent as `X-Ban-Regex`.
pub const BAN_REGEX_MARKER: &str = "vhp-ban-regex";
/// Bans the path itself, its trailing-slash form and any query variant, but
/// no sub-paths.
pub const ANY_QUERY_STRING_REGEX: &str = r"($|/$|\?.*|/\?.*)";

/// Returns true when `name` is one of the reserved purge markers.
pub fn is_marker(name: &str) -> bool {
    name == REGEX_MARKER || name == BAN_REGEX_MARKER
}

/// An absolute URL destined for invalidation.
///
/// Equality and hashing use [`dedup_key`], so two URLs differing only in
/// ordinary query parameters are the same purge target. The first-seen raw
/// value is kept verbatim for dispatch.
#[derive(Debug, Clone, Eq)]
pub struct PurgeUrl {
    raw: String,
    key: String,
}

impl PurgeUrl {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let key = dedup_key(&raw);
        Self { raw, key }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for PurgeUrl {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Hash for PurgeUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for PurgeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for PurgeUrl {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for PurgeUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Set-membership key for a purge URL.
///
/// Ordinary query pairs and the fragment are dropped; the reserved markers
/// survive so a wildcard purge of `/` never collapses into a plain purge of `/`.
pub fn dedup_key(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let markers: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(name, _)| is_marker(name))
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect();
            url.set_fragment(None);
            if markers.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(markers);
            }
            url.into()
        }
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    }
}

/// The URL that asks every cache host to drop everything under `home_url`.
pub fn wildcard_url(home_url: &str) -> String {
    format!("{}/?{REGEX_MARKER}", home_url.trim_end_matches('/'))
}

/// Marks `url` for a ban of its path plus any query-string variant.
///
/// Useful for REST endpoints, which are routinely requested with query
/// parameters. Caches whose VCL ignores `X-Ban-Regex` fall back to purging the
/// URL itself.
pub fn ban_url_with_any_query_string(url: &str, home_url: &str) -> String {
    ban_url_with_regex(url, home_url, ANY_QUERY_STRING_REGEX)
}

/// Marks `url` for a ban of `^<path><regex>`, where `<path>` is `url` with the
/// home URL prefix and any trailing slash removed.
pub fn ban_url_with_regex(url: &str, home_url: &str, regex: &str) -> String {
    let home = home_url.trim_end_matches('/');
    let path = url.strip_prefix(home).unwrap_or(url);
    let pattern = format!("^{}{regex}", path.trim_end_matches('/'));
    let encoded: String = form_urlencoded::byte_serialize(pattern.as_bytes()).collect();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{BAN_REGEX_MARKER}={encoded}")
}

/// Appends a slash unless one is already present.
pub(crate) fn trailingslashit(value: &str) -> String {
    format!("{}/", value.trim_end_matches(['/', '\\']))
}
