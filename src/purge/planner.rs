//! Purge action selection.
//!
//! Turns the URLs accumulated during a cycle, plus any manual request, into
//! the single action the cycle dispatches.

use std::fmt;

use serde::Serialize;
use url::Url;

use super::url::PurgeUrl;

/// An operator-issued purge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualRequest {
    FlushAll,
    FlushUrl(String),
    FlushObjectCache,
}

/// What a cycle does at the end of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeAction {
    Noop,
    PurgeEach(Vec<PurgeUrl>),
    PurgeAll,
    FlushObjectCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeActionKind {
    Noop,
    PurgeEach,
    PurgeAll,
    FlushObjectCache,
}

impl PurgeAction {
    pub fn kind(&self) -> PurgeActionKind {
        match self {
            PurgeAction::Noop => PurgeActionKind::Noop,
            PurgeAction::PurgeEach(_) => PurgeActionKind::PurgeEach,
            PurgeAction::PurgeAll => PurgeActionKind::PurgeAll,
            PurgeAction::FlushObjectCache => PurgeActionKind::FlushObjectCache,
        }
    }
}

impl fmt::Display for PurgeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeAction::Noop => f.write_str("Noop"),
            PurgeAction::PurgeEach(urls) => write!(f, "PurgeEach {{ urls: {} }}", urls.len()),
            PurgeAction::PurgeAll => f.write_str("PurgeAll"),
            PurgeAction::FlushObjectCache => f.write_str("FlushObjectCache"),
        }
    }
}

/// Picks the action for a cycle.
///
/// - An empty set defers to the manual request, if any
/// - `max_urls_before_all` or more URLs escalate to a full purge
/// - Otherwise each URL is purged individually
pub fn decide(
    urls: Vec<PurgeUrl>,
    manual: Option<&ManualRequest>,
    max_urls_before_all: usize,
) -> PurgeAction {
    if urls.is_empty() {
        return match manual {
            None => PurgeAction::Noop,
            Some(ManualRequest::FlushAll) => PurgeAction::PurgeAll,
            Some(ManualRequest::FlushObjectCache) => PurgeAction::FlushObjectCache,
            Some(ManualRequest::FlushUrl(url)) => match Url::parse(url) {
                Ok(parsed) if parsed.host_str().is_some_and(|host| !host.is_empty()) => {
                    PurgeAction::PurgeEach(vec![PurgeUrl::new(url.as_str())])
                }
                _ => PurgeAction::Noop,
            },
        };
    }

    if urls.len() >= max_urls_before_all {
        PurgeAction::PurgeAll
    } else {
        PurgeAction::PurgeEach(urls)
    }
}
