//! Cache purge engine.
//!
//! Change events are turned into URL sets, normalized, and either purged
//! individually or escalated to a full wildcard purge:
//!
//! ```text
//! ChangeEvent → UrlCollector → normalize → PurgeSet → decide → PurgeDispatcher
//! ```

pub mod collector;
pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod events;
pub mod hooks;
pub mod normalize;
pub mod planner;
pub mod target;
pub mod trigger;
pub mod url;

pub use collector::{UrlCollector, UrlGroups};
pub use config::PurgeConfig;
pub use cycle::{CycleReport, CycleState, PurgeCycle, PurgeEngine, PurgeSummary, RequestSummary};
pub use dispatcher::{DispatchError, PurgeDispatcher, PurgeRecord};
pub use events::{ChangeEvent, ChangeEventKind, EventScope, EventScopeTable};
pub use hooks::{
    HeaderFilter, NoObjectCache, ObjectCache, ObjectCacheError, PurgeObserver, TracingObserver,
    UrlSetFilter,
};
pub use normalize::{PurgeSet, normalize};
pub use planner::{ManualRequest, PurgeAction, PurgeActionKind, decide};
pub use target::{PurgeMethod, PurgeTarget, Scheme, resolve_targets};
pub use trigger::PurgeTrigger;
pub use url::{PurgeUrl, ban_url_with_any_query_string, ban_url_with_regex, wildcard_url};
