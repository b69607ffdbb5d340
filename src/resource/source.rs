//! Resource sources: where resources come from and how changes arrive.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use super::model::{Resource, ResourceId, ResourceType};
use crate::core::JsonMap;

/// Lifecycle event emitted by a source
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Added(Resource),
    Edited(Resource),
    Deleted {
        id: ResourceId,
        resource_type: ResourceType,
    },
}

impl ResourceEvent {
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::Added(r) | Self::Edited(r) => &r.id,
            Self::Deleted { id, .. } => id,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Added(r) | Self::Edited(r) => r.resource_type,
            Self::Deleted { resource_type, .. } => *resource_type,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {0}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid content file {0}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("{resource_type} entry #{index} has no string `id`")]
    MissingId {
        resource_type: ResourceType,
        index: usize,
    },

    #[error("{0} unavailable")]
    Unavailable(String),
}

pub type EventHandler = Arc<dyn Fn(&ResourceEvent) + Send + Sync>;

/// Persistence layer seen by the url service
pub trait ResourceSource: Send + Sync {
    /// Load every resource of one type.
    fn fetch_all(
        &self,
        resource_type: ResourceType,
    ) -> impl Future<Output = Result<Vec<Resource>, SourceError>> + Send;

    /// Register for lifecycle events.
    ///
    /// A source without an event bus must still implement this, even as a
    /// no-op, so that dropping live updates is a visible decision.
    fn subscribe(&self, handler: EventHandler);
}

/// In-process source with its own event bus
///
/// Keeps its resource list in sync with emitted events, so a later
/// `fetch_all` sees the same state the subscribers were told about.
#[derive(Default)]
pub struct MemorySource {
    resources: RwLock<IndexMap<ResourceType, Vec<Resource>>>,
    handlers: RwLock<Vec<EventHandler>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let source = Self::new();
        {
            let mut map = source.resources.write();
            for resource in resources {
                map.entry(resource.resource_type).or_default().push(resource);
            }
        }
        source
    }

    /// Load a content file:
    ///
    /// ```json
    /// { "posts": [{ "id": "1", "slug": "hello" }], "tags": [...] }
    /// ```
    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SourceError::Io(path.to_path_buf(), e))?;
        Self::from_json_str(&content).map_err(|e| match e {
            SourceError::Json(_, err) => SourceError::Json(path.to_path_buf(), err),
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, SourceError> {
        let raw: IndexMap<ResourceType, Vec<JsonMap>> =
            serde_json::from_str(content).map_err(|e| SourceError::Json(PathBuf::new(), e))?;

        let mut resources = Vec::new();
        for (resource_type, items) in raw {
            for (index, mut attributes) in items.into_iter().enumerate() {
                let id = match attributes.remove("id") {
                    Some(Value::String(id)) => id,
                    _ => return Err(SourceError::MissingId { resource_type, index }),
                };
                attributes.remove("type");
                resources.push(Resource {
                    id: ResourceId::new(id),
                    resource_type,
                    attributes,
                });
            }
        }
        Ok(Self::from_resources(resources))
    }

    pub fn len(&self) -> usize {
        self.resources.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an event to the local list and notify subscribers.
    pub fn emit(&self, event: ResourceEvent) {
        {
            let mut map = self.resources.write();
            let list = map.entry(event.resource_type()).or_default();
            match &event {
                ResourceEvent::Added(r) | ResourceEvent::Edited(r) => {
                    match list.iter_mut().find(|x| x.id == r.id) {
                        Some(existing) => *existing = r.clone(),
                        None => list.push(r.clone()),
                    }
                }
                ResourceEvent::Deleted { id, .. } => list.retain(|x| &x.id != id),
            }
        }

        let handlers = self.handlers.read().clone();
        for handler in handlers {
            handler(&event);
        }
    }
}

impl ResourceSource for MemorySource {
    fn fetch_all(
        &self,
        resource_type: ResourceType,
    ) -> impl Future<Output = Result<Vec<Resource>, SourceError>> + Send {
        let resources = self
            .resources
            .read()
            .get(&resource_type)
            .cloned()
            .unwrap_or_default();
        std::future::ready(Ok(resources))
    }

    fn subscribe(&self, handler: EventHandler) {
        self.handlers.write().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str() {
        let source = MemorySource::from_json_str(
            r#"{"posts": [{"id": "1", "slug": "a"}, {"id": "2", "slug": "b"}], "tags": [{"id": "t", "slug": "news"}]}"#,
        )
        .unwrap();
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_missing_id() {
        let err = MemorySource::from_json_str(r#"{"pages": [{"slug": "a"}]}"#)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SourceError::MissingId {
                resource_type: ResourceType::Pages,
                index: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_emit_updates_list_and_notifies() {
        let source = MemorySource::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let s = Arc::clone(&seen);
        source.subscribe(Arc::new(move |e: &ResourceEvent| s.write().push(e.id().clone())));

        source.emit(ResourceEvent::Added(Resource::new("1", ResourceType::Posts)));
        source.emit(ResourceEvent::Edited(
            Resource::new("1", ResourceType::Posts).with("slug", "x"),
        ));
        assert_eq!(source.fetch_all(ResourceType::Posts).await.unwrap().len(), 1);

        source.emit(ResourceEvent::Deleted {
            id: "1".into(),
            resource_type: ResourceType::Posts,
        });
        assert!(source.fetch_all(ResourceType::Posts).await.unwrap().is_empty());
        assert_eq!(seen.read().len(), 3);
    }
}
