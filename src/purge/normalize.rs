//! Deduplication and mirror-domain expansion of collected URLs.

use std::collections::HashSet;

use tracing::debug;
use url::Url;

use super::config::PurgeConfig;
use super::url::PurgeUrl;

/// Ordered set of pending purge URLs, unique by [`PurgeUrl::key`].
#[derive(Debug, Clone, Default)]
pub struct PurgeSet {
    urls: Vec<PurgeUrl>,
    seen: HashSet<String>,
}

impl PurgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `url` unless an equivalent one is already pending.
    pub fn insert(&mut self, url: PurgeUrl) -> bool {
        if !self.seen.insert(url.key().to_string()) {
            return false;
        }
        self.urls.push(url);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(&PurgeUrl::new(url).key().to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PurgeUrl> {
        self.urls.iter()
    }

    /// Takes every pending URL, leaving the set empty.
    pub fn drain(&mut self) -> Vec<PurgeUrl> {
        self.seen.clear();
        std::mem::take(&mut self.urls)
    }
}

impl Extend<PurgeUrl> for PurgeSet {
    fn extend<I: IntoIterator<Item = PurgeUrl>>(&mut self, iter: I) {
        for url in iter {
            self.insert(url);
        }
    }
}

impl FromIterator<PurgeUrl> for PurgeSet {
    fn from_iter<I: IntoIterator<Item = PurgeUrl>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Deduplicates `urls` and adds a copy of every home-host URL for each mirror
/// domain. Applying it twice yields the same set as applying it once.
pub fn normalize<I, U>(urls: I, home_url: &str, config: &PurgeConfig) -> Vec<PurgeUrl>
where
    I: IntoIterator<Item = U>,
    U: Into<PurgeUrl>,
{
    let mut set: PurgeSet = urls.into_iter().map(Into::into).collect();

    let home_host = Url::parse(home_url)
        .ok()
        .and_then(|home| home.host_str().map(str::to_string));
    let mirrors = mirror_hosts(&config.mirror_domains, home_host.as_deref());

    if let Some(home_host) = home_host.as_deref()
        && !mirrors.is_empty()
    {
        let originals: Vec<PurgeUrl> = set.iter().cloned().collect();
        for original in originals {
            set.extend(mirror_copies(&original, home_host, &mirrors));
        }
    }

    set.drain()
}

fn mirror_hosts(domains: &[String], home_host: Option<&str>) -> Vec<String> {
    domains
        .iter()
        .filter_map(|domain| {
            let domain = domain.trim();
            if domain.contains("://") {
                Url::parse(domain)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string))
            } else {
                domain
                    .split(['/', ':'])
                    .next()
                    .filter(|host| !host.is_empty())
                    .map(str::to_string)
            }
        })
        .filter(|host| Some(host.as_str()) != home_host)
        .collect()
}

fn mirror_copies(original: &PurgeUrl, home_host: &str, mirrors: &[String]) -> Vec<PurgeUrl> {
    let Ok(url) = Url::parse(original.as_str()) else {
        return Vec::new();
    };
    if url.host_str() != Some(home_host) {
        return Vec::new();
    }

    mirrors
        .iter()
        .filter_map(|mirror| {
            let mut copy = url.clone();
            match copy.set_host(Some(mirror)) {
                Ok(()) => Some(PurgeUrl::new(String::from(copy))),
                Err(err) => {
                    debug!(mirror = %mirror, error = %err, "Skipping unusable mirror domain");
                    None
                }
            }
        })
        .collect()
}
