//! Bidirectional resource <-> url table.
//!
//! ```text
//! by_id:        ResourceId  ──► UrlEntry { url, generator_id, resource }
//! by_url:       UrlPath     ──► [ResourceId, ...]   (usually one)
//! by_generator: GeneratorId ──► {ResourceId, ...}
//! ```
//!
//! Every mutation updates all three indexes under one write lock, so the
//! one-entry-per-resource invariant holds at every observable point.
//! Listeners run after the lock is released.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::conflict::UrlConflict;
use crate::core::{ListenerId, UrlPath, UrlUtils};
use crate::generator::GeneratorId;
use crate::log;
use crate::resource::{Resource, ResourceId};
use crate::service::UrlServiceError;

/// A resource's assigned url and the generator that owns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub url: UrlPath,
    pub generator_id: GeneratorId,
    pub resource: Arc<Resource>,
}

/// Change notification for downstream consumers (sitemaps, caches)
#[derive(Debug, Clone)]
pub enum UrlEvent {
    Added {
        relative: UrlPath,
        absolute: String,
        resource: Arc<Resource>,
    },
    Removed {
        url: UrlPath,
        resource: Arc<Resource>,
    },
}

pub type UrlListener = Arc<dyn Fn(&UrlEvent) + Send + Sync>;

/// Persisted form of the table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlSnapshot {
    #[serde(default)]
    pub fingerprint: String,
    pub entries: Vec<UrlEntry>,
}

#[derive(Debug, Default)]
struct TableInner {
    by_id: FxHashMap<ResourceId, UrlEntry>,
    by_url: FxHashMap<UrlPath, SmallVec<[ResourceId; 1]>>,
    by_generator: FxHashMap<GeneratorId, BTreeSet<ResourceId>>,
}

impl TableInner {
    fn insert(&mut self, entry: UrlEntry) {
        let id = entry.resource.id.clone();
        self.by_url
            .entry(entry.url.clone())
            .or_default()
            .push(id.clone());
        self.by_generator
            .entry(entry.generator_id)
            .or_default()
            .insert(id.clone());
        self.by_id.insert(id, entry);
    }

    fn remove(&mut self, id: &ResourceId) -> Option<UrlEntry> {
        let entry = self.by_id.remove(id)?;

        if let Some(ids) = self.by_url.get_mut(&entry.url) {
            ids.retain(|x| x != id);
            if ids.is_empty() {
                self.by_url.remove(&entry.url);
            }
        }
        if let Some(ids) = self.by_generator.get_mut(&entry.generator_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_generator.remove(&entry.generator_id);
            }
        }
        Some(entry)
    }

    fn collect<'a>(&self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Vec<UrlEntry> {
        ids.into_iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

pub struct UrlTable {
    inner: RwLock<TableInner>,
    listeners: RwLock<Vec<(ListenerId, UrlListener)>>,
    next_listener: AtomicU64,
    utils: UrlUtils,
}

impl UrlTable {
    pub fn new(utils: UrlUtils) -> Self {
        Self {
            inner: RwLock::new(TableInner::default()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            utils,
        }
    }

    /// Insert the entry for `entry.resource.id`.
    ///
    /// An existing entry for the same id is an internal inconsistency: it is
    /// logged, removed (with its `Removed` event) and replaced.
    pub fn add(&self, entry: UrlEntry) {
        let relative = entry.url.clone();
        let resource = Arc::clone(&entry.resource);

        let replaced = {
            let mut inner = self.inner.write();
            let replaced = inner.remove(&entry.resource.id);
            inner.insert(entry);
            replaced
        };

        if let Some(old) = replaced {
            let err = UrlServiceError::DuplicateResource {
                id: old.resource.id.clone(),
                url: old.url.clone(),
            };
            log!("error"; "{}: {}", err.code(), err);
            self.emit(&UrlEvent::Removed {
                url: old.url,
                resource: old.resource,
            });
        }

        let absolute = self.utils.create_url(relative.as_str(), true);
        self.emit(&UrlEvent::Added {
            relative,
            absolute,
            resource,
        });
    }

    pub fn get_by_resource_id(&self, id: &ResourceId) -> Option<UrlEntry> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Every entry sharing this exact url, in insertion order.
    pub fn get_by_url(&self, url: &UrlPath) -> Vec<UrlEntry> {
        let inner = self.inner.read();
        match inner.by_url.get(url) {
            Some(ids) => inner.collect(ids.iter()),
            None => Vec::new(),
        }
    }

    pub fn get_by_generator_id(&self, generator_id: GeneratorId) -> Vec<UrlEntry> {
        let inner = self.inner.read();
        match inner.by_generator.get(&generator_id) {
            Some(ids) => inner.collect(ids.iter()),
            None => Vec::new(),
        }
    }

    pub fn remove_resource_id(&self, id: &ResourceId) -> Option<UrlEntry> {
        let removed = self.inner.write().remove(id)?;
        self.emit(&UrlEvent::Removed {
            url: removed.url.clone(),
            resource: Arc::clone(&removed.resource),
        });
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries sorted by url, then resource id.
    pub fn entries(&self) -> Vec<UrlEntry> {
        let mut entries: Vec<UrlEntry> = self.inner.read().by_id.values().cloned().collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.resource.id.cmp(&b.resource.id)));
        entries
    }

    pub fn utils(&self) -> &UrlUtils {
        &self.utils
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&UrlEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn emit(&self, event: &UrlEvent) {
        let listeners: Vec<UrlListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    /// Urls currently claimed by more than one resource.
    pub fn conflicts(&self) -> Vec<UrlConflict> {
        let inner = self.inner.read();
        let mut conflicts: Vec<UrlConflict> = inner
            .by_url
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(url, ids)| UrlConflict {
                url: url.clone(),
                claims: inner
                    .collect(ids.iter())
                    .into_iter()
                    .map(|e| (e.generator_id, e.resource.id.clone()))
                    .collect(),
            })
            .collect();
        conflicts.sort_by(|a, b| a.url.cmp(&b.url));
        conflicts
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn snapshot(&self) -> UrlSnapshot {
        UrlSnapshot {
            fingerprint: String::new(),
            entries: self.entries(),
        }
    }

    /// Replace contents without emitting events.
    pub fn restore(&self, snapshot: UrlSnapshot) {
        let mut inner = TableInner::default();
        for entry in snapshot.entries {
            inner.remove(&entry.resource.id);
            inner.insert(entry);
        }
        *self.inner.write() = inner;
    }

    /// Drop all entries. Listeners stay registered.
    pub fn reset(&self) {
        *self.inner.write() = TableInner::default();
    }
}

impl std::fmt::Debug for UrlTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlTable")
            .field("entries", &self.len())
            .field("utils", &self.utils)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use parking_lot::Mutex;

    fn entry(id: &str, url: &str, generator: u32) -> UrlEntry {
        UrlEntry {
            url: UrlPath::from_page(url),
            generator_id: GeneratorId(generator),
            resource: Arc::new(Resource::new(id, ResourceType::Posts)),
        }
    }

    #[test]
    fn test_lookup_all_indexes() {
        let table = UrlTable::new(UrlUtils::default());
        table.add(entry("1", "/a/", 0));
        table.add(entry("2", "/b/", 0));
        table.add(entry("3", "/b/", 1));

        let id: ResourceId = "1".into();
        assert_eq!(table.get_by_resource_id(&id).unwrap().url, "/a/");
        assert_eq!(table.get_by_url(&UrlPath::from_page("/b/")).len(), 2);
        assert_eq!(table.get_by_generator_id(GeneratorId(0)).len(), 2);
        assert!(table.get_by_url(&UrlPath::from_page("/nope/")).is_empty());
    }

    #[test]
    fn test_duplicate_add_replaces() {
        let table = UrlTable::new(UrlUtils::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&events);
        table.add_listener(move |event| {
            e.lock().push(match event {
                UrlEvent::Added { relative, .. } => format!("+{relative}"),
                UrlEvent::Removed { url, .. } => format!("-{url}"),
            })
        });

        table.add(entry("1", "/old/", 0));
        table.add(entry("1", "/new/", 0));

        assert_eq!(table.len(), 1);
        assert!(table.get_by_url(&UrlPath::from_page("/old/")).is_empty());
        assert_eq!(table.get_by_resource_id(&"1".into()).unwrap().url, "/new/");
        assert_eq!(*events.lock(), vec!["+/old/", "-/old/", "+/new/"]);
    }

    #[test]
    fn test_added_event_has_absolute_url() {
        let table = UrlTable::new(UrlUtils::new("https://example.com/blog/").unwrap());
        let absolute = Arc::new(Mutex::new(String::new()));
        let a = Arc::clone(&absolute);
        table.add_listener(move |event| {
            if let UrlEvent::Added { absolute, .. } = event {
                *a.lock() = absolute.clone();
            }
        });

        table.add(entry("1", "/hello/", 0));
        assert_eq!(*absolute.lock(), "https://example.com/blog/hello/");
    }

    #[test]
    fn test_remove_cleans_secondary_indexes() {
        let table = UrlTable::new(UrlUtils::default());
        table.add(entry("1", "/a/", 3));
        assert!(table.remove_resource_id(&"1".into()).is_some());
        assert!(table.remove_resource_id(&"1".into()).is_none());
        assert!(table.get_by_generator_id(GeneratorId(3)).is_empty());
        assert!(table.get_by_url(&UrlPath::from_page("/a/")).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_conflicts() {
        let table = UrlTable::new(UrlUtils::default());
        table.add(entry("1", "/shared/", 0));
        table.add(entry("2", "/shared/", 1));
        table.add(entry("3", "/solo/", 1));

        let conflicts = table.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].url, "/shared/");
        assert_eq!(conflicts[0].claims.len(), 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let table = UrlTable::new(UrlUtils::default());
        table.add(entry("1", "/a/", 0));
        table.add(entry("2", "/b/", 1));

        let json = serde_json::to_string(&table.snapshot()).unwrap();
        let restored = UrlTable::new(UrlUtils::default());
        restored.restore(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.entries(), table.entries());
        assert_eq!(restored.get_by_generator_id(GeneratorId(1)).len(), 1);

        restored.reset();
        assert!(restored.is_empty());
    }
}
