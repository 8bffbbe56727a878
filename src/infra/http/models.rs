use serde::{Deserialize, Serialize};

use crate::domain::entities::DocumentId;
use crate::purge::{ChangeEvent, ChangeEventKind};

#[derive(Debug, Deserialize, Serialize)]
pub struct PurgeUrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EventRequest {
    pub kind: ChangeEventKind,
    #[serde(default)]
    pub document_id: Option<DocumentId>,
}

impl From<EventRequest> for ChangeEvent {
    fn from(request: EventRequest) -> Self {
        ChangeEvent::new(request.kind, request.document_id)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EventsRequest {
    pub events: Vec<EventRequest>,
}
