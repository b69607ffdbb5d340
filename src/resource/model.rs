//! Resource types: identity, kind and attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::JsonMap;

/// Stable unique identifier of a resource (unique across all types)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Kind of content resource tracked by the url service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Posts,
    Pages,
    Tags,
    Authors,
}

impl ResourceType {
    pub const ALL: [Self; 4] = [Self::Posts, Self::Pages, Self::Tags, Self::Authors];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Pages => "pages",
            Self::Tags => "tags",
            Self::Authors => "authors",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an indexed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Indexed, not claimed by any generator
    Pending,
    /// Claimed by exactly one generator
    Active,
    /// Deleted from the store
    Removed,
}

/// Light reference to a resource, used as queue payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub id: ResourceId,
    pub resource_type: ResourceType,
}

/// A content item: identity plus queryable attributes
///
/// Serializes flat, with `id` and `type` next to the attributes:
/// ```json
/// { "id": "5f1", "type": "posts", "slug": "hello", "published_at": "2024-01-10T09:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(flatten)]
    pub attributes: JsonMap,
}

impl Resource {
    pub fn new(id: impl Into<ResourceId>, resource_type: ResourceType) -> Self {
        Self {
            id: id.into(),
            resource_type,
            attributes: JsonMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef {
            id: self.id.clone(),
            resource_type: self.resource_type,
        }
    }

    /// Look up an attribute.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Attribute as string, if it is one.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn slug(&self) -> Option<&str> {
        self.attr_str("slug")
    }

    /// Publication date, falling back to creation date.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        ["published_at", "created_at"]
            .iter()
            .filter_map(|key| self.attr_str(key))
            .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Slug of the first element of a relation list (`tags`, `authors`).
    pub fn primary_slug(&self, relation: &str) -> Option<&str> {
        match self.attr(relation)? {
            Value::Array(items) => items.first().and_then(relation_slug),
            _ => None,
        }
    }
}

/// Slug of a relation element: either a plain string or an object with `slug`.
pub(crate) fn relation_slug(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("slug").and_then(Value::as_str),
        _ => None,
    }
}
