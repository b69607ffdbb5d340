//! Core types - pure abstractions shared across the codebase.

mod state;
mod timezone;
mod url;

pub use state::{ServiceState, StateCell};
pub use timezone::SiteTimezone;
pub use url::{UrlPath, UrlUtils, url_join};

/// A JSON object map for storing arbitrary resource attributes.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Handle returned when registering a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
