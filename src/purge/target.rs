//! Resolution of a purge URL into concrete per-cache-host requests.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::{Url, form_urlencoded};

use super::config::PurgeConfig;
use super::url::{BAN_REGEX_MARKER, REGEX_MARKER};

pub const PURGE_METHOD_HEADER: &str = "x-purge-method";
pub const BAN_REGEX_HEADER: &str = "x-ban-regex";
const WILDCARD_SUFFIX: &str = ".*";
/// Ban pattern used when the marker carries no expression.
const ANY_PATH: &str = ".*";
const HOSTED_PREFIX: &str = "dp-";
const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Managed hosting machines (`dp-*`) only accept purges over HTTPS.
    pub fn for_hostname(hostname: Option<&str>) -> Self {
        match hostname {
            Some(name) if name.starts_with(HOSTED_PREFIX) => Scheme::Https,
            _ => Scheme::Http,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_end_matches("://").to_ascii_lowercase();
        match trimmed.as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(format!("unsupported scheme `{other}`; expected http or https")),
        }
    }
}

/// Value of the `X-Purge-Method` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurgeMethod {
    Default,
    Regex,
    BanRegex,
}

impl PurgeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PurgeMethod::Default => "default",
            PurgeMethod::Regex => "regex",
            PurgeMethod::BanRegex => "ban-regex",
        }
    }
}

impl fmt::Display for PurgeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One purge request against one cache host.
#[derive(Debug, Clone)]
pub struct PurgeTarget {
    /// URL reported to observers. Equals the input URL unless the cache host
    /// is `localhost`, in which case its host is rewritten to match.
    pub url: String,
    /// URL the request is sent to.
    pub purge_url: String,
    pub cache_host: String,
    pub method: PurgeMethod,
    pub headers: HeaderMap,
}

/// Expands `url` into one [`PurgeTarget`] per configured cache host.
///
/// URLs that fail to parse or carry no host yield no targets.
pub fn resolve_targets(url: &str, config: &PurgeConfig) -> Vec<PurgeTarget> {
    let Ok(parsed) = Url::parse(url) else {
        debug!(url, "Dropping unparsable purge url");
        return Vec::new();
    };
    let Some(host) = parsed.host_str().filter(|host| !host.is_empty()) else {
        debug!(url, "Dropping purge url without host");
        return Vec::new();
    };

    let mut wildcard = false;
    let mut ban_regex: Option<String> = None;
    let mut preserved = Vec::new();
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            REGEX_MARKER => wildcard = true,
            BAN_REGEX_MARKER if value.is_empty() => ban_regex = Some(ANY_PATH.to_string()),
            BAN_REGEX_MARKER => ban_regex = Some(value.into_owned()),
            _ => preserved.push((name.into_owned(), value.into_owned())),
        }
    }

    // A ban regex wins over a wildcard marker on the same URL.
    let (method, suffix) = match (&ban_regex, wildcard) {
        (Some(_), _) => (PurgeMethod::BanRegex, ""),
        (None, true) => (PurgeMethod::Regex, WILDCARD_SUFFIX),
        (None, false) => (PurgeMethod::Default, ""),
    };

    let host_header = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let Ok(host_value) = HeaderValue::from_str(&host_header) else {
        debug!(url, "Dropping purge url with unencodable host");
        return Vec::new();
    };

    let mut headers = HeaderMap::new();
    headers.insert(HOST, host_value);
    headers.insert(
        HeaderName::from_static(PURGE_METHOD_HEADER),
        HeaderValue::from_static(method.as_str()),
    );
    if let Some(regex) = &ban_regex {
        match HeaderValue::from_str(regex) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(BAN_REGEX_HEADER), value);
            }
            Err(_) => {
                debug!(url, "Dropping purge url with unencodable ban regex");
                return Vec::new();
            }
        }
    }

    let query = (!preserved.is_empty()).then(|| {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&preserved)
            .finish()
    });

    let scheme = config.scheme();
    let cache_hosts: Vec<&str> = if config.cache_hosts.is_empty() {
        vec![host]
    } else {
        config.cache_hosts.iter().map(String::as_str).collect()
    };

    cache_hosts
        .into_iter()
        .map(|cache_host| {
            let mut purge_url = format!("{scheme}://{cache_host}{}{suffix}", parsed.path());
            if let Some(query) = &query {
                purge_url.push('?');
                purge_url.push_str(query);
            }

            PurgeTarget {
                url: reported_url(url, &parsed, cache_host),
                purge_url,
                cache_host: cache_host.to_string(),
                method,
                headers: headers.clone(),
            }
        })
        .collect()
}

fn reported_url(url: &str, parsed: &Url, cache_host: &str) -> String {
    if cache_host != LOCALHOST {
        return url.to_string();
    }
    let mut local = parsed.clone();
    match local.set_host(Some(LOCALHOST)) {
        Ok(()) => local.into(),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(hosts: &[&str]) -> PurgeConfig {
        PurgeConfig {
            cache_hosts: hosts.iter().map(|host| host.to_string()).collect(),
            ..Default::default()
        }
    }

    fn header<'a>(target: &'a PurgeTarget, name: &str) -> Option<&'a str> {
        target.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[test]
    fn plain_url_uses_own_host_without_cache_hosts() {
        let targets = resolve_targets("https://a.test/hello/", &config(&[]));
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.purge_url, "http://a.test/hello/");
        assert_eq!(target.method, PurgeMethod::Default);
        assert_eq!(header(target, "host"), Some("a.test"));
        assert_eq!(header(target, PURGE_METHOD_HEADER), Some("default"));
        assert!(target.headers.get(BAN_REGEX_HEADER).is_none());
    }

    #[test]
    fn fans_out_to_every_cache_host() {
        let targets = resolve_targets("https://a.test/hello/", &config(&["10.0.0.1", "10.0.0.2:6081"]));
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].purge_url, "http://10.0.0.1/hello/");
        assert_eq!(targets[1].purge_url, "http://10.0.0.2:6081/hello/");
        for target in &targets {
            assert_eq!(header(target, "host"), Some("a.test"));
            assert_eq!(target.method, PurgeMethod::Default);
            assert_eq!(target.url, "https://a.test/hello/");
        }
    }

    #[test]
    fn wildcard_marker_appends_suffix() {
        let targets = resolve_targets("https://a.test/?vhp-regex", &config(&["10.0.0.1"]));
        assert_eq!(targets[0].purge_url, "http://10.0.0.1/.*");
        assert_eq!(targets[0].method, PurgeMethod::Regex);
        assert_eq!(header(&targets[0], PURGE_METHOD_HEADER), Some("regex"));
    }

    #[test]
    fn ban_marker_sets_ban_header() {
        let url = "https://a.test/wp-json/wp/v2/posts/?vhp-ban-regex=%5E%2Fwp-json%2Fwp%2Fv2%2Fposts%24";
        let targets = resolve_targets(url, &config(&["10.0.0.1"]));
        let target = &targets[0];
        assert_eq!(target.purge_url, "http://10.0.0.1/wp-json/wp/v2/posts/");
        assert_eq!(target.method, PurgeMethod::BanRegex);
        assert_eq!(header(target, PURGE_METHOD_HEADER), Some("ban-regex"));
        assert_eq!(header(target, BAN_REGEX_HEADER), Some("^/wp-json/wp/v2/posts$"));
    }

    #[test]
    fn empty_ban_marker_bans_every_path() {
        let targets = resolve_targets("https://a.test/x/?vhp-ban-regex=", &config(&["10.0.0.1"]));
        let target = &targets[0];
        assert_eq!(target.method, PurgeMethod::BanRegex);
        assert_eq!(header(target, BAN_REGEX_HEADER), Some(".*"));
        assert_eq!(target.purge_url, "http://10.0.0.1/x/");

        let bare = resolve_targets("https://a.test/x/?vhp-ban-regex", &config(&[]));
        assert_eq!(header(&bare[0], BAN_REGEX_HEADER), Some(".*"));
    }

    #[test]
    fn ban_marker_wins_over_regex_marker() {
        let targets = resolve_targets("https://a.test/x/?vhp-regex&vhp-ban-regex=%5E%2Fx", &config(&[]));
        assert_eq!(targets[0].method, PurgeMethod::BanRegex);
        assert_eq!(targets[0].purge_url, "http://a.test/x/");
    }

    #[test]
    fn ordinary_query_pairs_are_preserved() {
        let targets = resolve_targets("https://a.test/list/?page=2&vhp-regex", &config(&["c.test"]));
        assert_eq!(targets[0].purge_url, "http://c.test/list/.*?page=2");
    }

    #[test]
    fn explicit_port_is_kept_in_host_header() {
        let targets = resolve_targets("http://a.test:8080/x/", &config(&["10.0.0.1"]));
        assert_eq!(header(&targets[0], "host"), Some("a.test:8080"));
    }

    #[test]
    fn localhost_cache_host_rewrites_reported_url() {
        let targets = resolve_targets("https://a.test/x/", &config(&["localhost"]));
        assert_eq!(targets[0].url, "https://localhost/x/");
        assert_eq!(header(&targets[0], "host"), Some("a.test"));
    }

    #[test]
    fn forced_scheme_applies_to_every_target() {
        let config = PurgeConfig {
            schema: Some(Scheme::Https),
            cache_hosts: vec!["10.0.0.1".into()],
            ..Default::default()
        };
        let targets = resolve_targets("http://a.test/", &config);
        assert_eq!(targets[0].purge_url, "https://10.0.0.1/");
    }

    #[test]
    fn malformed_urls_yield_no_targets() {
        assert!(resolve_targets("not a url", &config(&["10.0.0.1"])).is_empty());
        assert!(resolve_targets("mailto:someone@a.test", &config(&[])).is_empty());
    }

    #[test]
    fn scheme_parses_with_or_without_separator() {
        assert_eq!("https://".parse::<Scheme>(), Ok(Scheme::Https));
        assert_eq!("HTTP".parse::<Scheme>(), Ok(Scheme::Http));
        assert!("ftp".parse::<Scheme>().is_err());
    }
}
