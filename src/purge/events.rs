//! Content change events.
//!
//! Defines the changes a purge cycle reacts to and how far each one reaches.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::DocumentId;

/// Types of content changes that trigger invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    // Documents
    /// A document was saved (created or status changed).
    Saved,
    /// A document was edited in place.
    Edited,
    /// A document was permanently deleted.
    Deleted,
    /// A document was moved to the trash.
    Trashed,
    /// An attachment was deleted.
    AttachmentDeleted,

    // Site-wide
    /// The active theme changed.
    ThemeSwitched,
    /// An external page-cache integration reported its cache was cleared.
    ExternalCacheCleared,
}

impl ChangeEventKind {
    pub const ALL: [ChangeEventKind; 7] = [
        ChangeEventKind::Saved,
        ChangeEventKind::Edited,
        ChangeEventKind::Deleted,
        ChangeEventKind::Trashed,
        ChangeEventKind::AttachmentDeleted,
        ChangeEventKind::ThemeSwitched,
        ChangeEventKind::ExternalCacheCleared,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeEventKind::Saved => "saved",
            ChangeEventKind::Edited => "edited",
            ChangeEventKind::Deleted => "deleted",
            ChangeEventKind::Trashed => "trashed",
            ChangeEventKind::AttachmentDeleted => "attachment_deleted",
            ChangeEventKind::ThemeSwitched => "theme_switched",
            ChangeEventKind::ExternalCacheCleared => "external_cache_cleared",
        }
    }
}

impl fmt::Display for ChangeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeEventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let expected: Vec<&str> = Self::ALL.iter().map(|kind| kind.as_str()).collect();
                format!(
                    "unknown event kind `{value}`; expected one of {}",
                    expected.join(", ")
                )
            })
    }
}

/// How far an event reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventScope {
    /// Purge the URLs related to the event's document.
    #[serde(rename = "document")]
    Document,
    /// Purge everything under the home URL.
    #[serde(rename = "full")]
    FullPurge,
}

/// Maps each event kind to its scope.
///
/// Site-wide kinds default to [`EventScope::FullPurge`]; everything else is
/// document-scoped. Entries present in configuration override the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EventScopeTable {
    overrides: HashMap<ChangeEventKind, EventScope>,
}

impl EventScopeTable {
    pub fn with_override(mut self, kind: ChangeEventKind, scope: EventScope) -> Self {
        self.overrides.insert(kind, scope);
        self
    }

    pub fn scope(&self, kind: ChangeEventKind) -> EventScope {
        if let Some(scope) = self.overrides.get(&kind) {
            return *scope;
        }
        match kind {
            ChangeEventKind::ThemeSwitched | ChangeEventKind::ExternalCacheCleared => {
                EventScope::FullPurge
            }
            _ => EventScope::Document,
        }
    }
}

/// A content change observed during a request.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Unique identifier for correlating logs (UUIDv4).
    pub id: Uuid,
    pub kind: ChangeEventKind,
    /// The affected document; `None` for site-wide events.
    pub document: Option<DocumentId>,
    pub timestamp: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(kind: ChangeEventKind, document: Option<DocumentId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            document,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// An event about a single document.
    pub fn for_document(kind: ChangeEventKind, document: DocumentId) -> Self {
        Self::new(kind, Some(document))
    }

    /// An event about the whole site.
    pub fn site_wide(kind: ChangeEventKind) -> Self {
        Self::new(kind, None)
    }
}
