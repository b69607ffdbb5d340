//! In-memory resource index.
//!
//! # Architecture
//!
//! ```text
//! ResourceSource ──fetch_all──► ResourceStore ──queue `init`────► generators
//!        │                          │ ▲
//!        └──events──► handle_event ─┘ └── claim / release (ownership)
//!                           │
//!                           ├─ owned   → owning generator (observer)
//!                           └─ unowned → queue `added:<type>`
//! ```
//!
//! The store exclusively owns resources (`Arc<Resource>`); the url table
//! shares the same allocation. Observers are held weakly so that dropping
//! a generator never keeps it alive through the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::model::{Resource, ResourceId, ResourceState, ResourceType};
use super::source::{ResourceEvent, ResourceSource};
use crate::filter::Filter;
use crate::generator::GeneratorId;
use crate::queue::{Queue, Stage, StageEvent};
use crate::service::UrlServiceError;
use crate::urls::UrlTable;
use crate::{debug, log};

/// Verdict of an owning generator after a resource changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Retained,
    Released,
}

/// Owner-side callbacks for resources a generator has claimed.
pub trait ResourceObserver: Send + Sync {
    /// The resource was replaced. Recompute or give it up.
    fn on_updated(&self, resource: &Arc<Resource>) -> Ownership;

    /// The resource was deleted from the store.
    fn on_removed(&self, id: &ResourceId);
}

/// Tracked resource types and their admission filters
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    types: IndexMap<ResourceType, Filter>,
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    pub fn track(mut self, resource_type: ResourceType, filter: Filter) -> Self {
        self.types.insert(resource_type, filter);
        self
    }

    pub fn is_tracked(&self, resource_type: ResourceType) -> bool {
        self.types.contains_key(&resource_type)
    }

    pub fn types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.types.keys().copied()
    }

    /// Whether the resource passes its type's admission filter.
    pub fn admits(&self, resource: &Resource) -> bool {
        self.types
            .get(&resource.resource_type)
            .is_some_and(|filter| filter.matches(resource))
    }
}

impl Default for ResourceConfig {
    /// Published posts and pages, public tags, every author.
    fn default() -> Self {
        let published = Filter::parse("status:published").unwrap_or_default();
        let public = Filter::parse("visibility:public").unwrap_or_default();
        Self::new()
            .track(ResourceType::Posts, published.clone())
            .track(ResourceType::Pages, published)
            .track(ResourceType::Tags, public)
            .track(ResourceType::Authors, Filter::all())
    }
}

/// Resource plus bookkeeping
#[derive(Debug, Clone)]
struct StoredResource {
    resource: Arc<Resource>,
    state: ResourceState,
    owner: Option<GeneratorId>,
}

impl StoredResource {
    fn pending(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            state: ResourceState::Pending,
            owner: None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Insertion-ordered per type, so generators claim in fetch order
    data: FxHashMap<ResourceType, IndexMap<ResourceId, StoredResource>>,
    types_by_id: FxHashMap<ResourceId, ResourceType>,
}

impl StoreInner {
    fn entry(&self, id: &ResourceId) -> Option<&StoredResource> {
        let ty = self.types_by_id.get(id)?;
        self.data.get(ty)?.get(id)
    }

    fn entry_mut(&mut self, id: &ResourceId) -> Option<&mut StoredResource> {
        let ty = self.types_by_id.get(id)?;
        self.data.get_mut(ty)?.get_mut(id)
    }

    fn insert(&mut self, stored: StoredResource) {
        let id = stored.resource.id.clone();
        let ty = stored.resource.resource_type;
        if let Some(previous) = self.types_by_id.insert(id.clone(), ty)
            && previous != ty
            && let Some(list) = self.data.get_mut(&previous)
        {
            list.shift_remove(&id);
        }
        self.data.entry(ty).or_default().insert(id, stored);
    }

    fn remove(&mut self, id: &ResourceId) -> Option<StoredResource> {
        let ty = self.types_by_id.remove(id)?;
        self.data.get_mut(&ty)?.shift_remove(id)
    }
}

/// Persisted form of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(default)]
    pub fingerprint: String,
    pub resources: Vec<Resource>,
}

pub struct ResourceStore {
    inner: RwLock<StoreInner>,
    observers: RwLock<FxHashMap<GeneratorId, Weak<dyn ResourceObserver>>>,
    config: RwLock<ResourceConfig>,
    queue: Arc<Queue>,
    /// Events are processed only while listening
    listening: AtomicBool,
    /// Source subscription is made once
    subscribed: AtomicBool,
    /// Serializes event handling
    dispatch: Mutex<()>,
}

impl ResourceStore {
    pub fn new(queue: Arc<Queue>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            observers: RwLock::new(FxHashMap::default()),
            config: RwLock::new(ResourceConfig::default()),
            queue,
            listening: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            dispatch: Mutex::new(()),
        }
    }

    pub fn init_resource_config(&self, config: ResourceConfig) {
        *self.config.write() = config;
    }

    pub fn resource_config(&self) -> ResourceConfig {
        self.config.read().clone()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Bulk load every tracked type. Returns the number of admitted resources.
    pub async fn fetch_resources<S: ResourceSource>(
        &self,
        source: &S,
    ) -> Result<usize, UrlServiceError> {
        let config = self.resource_config();
        let mut admitted = 0;

        for resource_type in config.types() {
            let fetched = source
                .fetch_all(resource_type)
                .await
                .map_err(|source| UrlServiceError::Fetch {
                    resource_type,
                    source,
                })?;

            let total = fetched.len();
            {
                let mut inner = self.inner.write();
                for resource in fetched
                    .into_iter()
                    .filter(|r| r.resource_type == resource_type && config.admits(r))
                {
                    inner.insert(StoredResource::pending(Arc::new(resource)));
                    admitted += 1;
                }
            }

            debug!("fetch"; "{}: {} fetched", resource_type, total);
        }

        Ok(admitted)
    }

    /// Subscribe to the source's lifecycle events. A second call only
    /// re-enables handling.
    pub fn init_event_listeners<S: ResourceSource>(self: &Arc<Self>, source: &S) {
        self.listening.store(true, Ordering::SeqCst);
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }

        let store = Arc::downgrade(self);
        source.subscribe(Arc::new(move |event: &ResourceEvent| {
            if let Some(store) = store.upgrade()
                && store.is_listening()
            {
                store.handle_event(event.clone());
            }
        }));
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Apply a lifecycle event, then notify affected generators.
    pub fn handle_event(&self, event: ResourceEvent) {
        let _serial = self.dispatch.lock();

        if !self.config.read().is_tracked(event.resource_type()) {
            return;
        }

        match event {
            ResourceEvent::Added(resource) => {
                if self.inner.read().entry(&resource.id).is_some() {
                    self.on_edited(resource);
                } else {
                    self.on_added(resource);
                }
            }
            ResourceEvent::Edited(resource) => self.on_edited(resource),
            ResourceEvent::Deleted { id, .. } => self.on_deleted(&id),
        }
    }

    fn on_added(&self, resource: Resource) {
        if !self.config.read().admits(&resource) {
            debug!("resources"; "skip {} {}: not admitted", resource.resource_type, resource.id);
            return;
        }

        let resource = Arc::new(resource);
        self.inner
            .write()
            .insert(StoredResource::pending(Arc::clone(&resource)));
        self.offer(&resource);
    }

    fn on_edited(&self, resource: Resource) {
        let admitted = self.config.read().admits(&resource);
        let owner = self.inner.read().entry(&resource.id).map(|s| s.owner);

        let owner = match (owner, admitted) {
            (None, false) => return,
            (None, true) => return self.on_added(resource),
            (Some(_), false) => return self.on_deleted(&resource.id),
            (Some(owner), true) => owner,
        };

        let resource = Arc::new(resource);
        if let Some(stored) = self.inner.write().entry_mut(&resource.id) {
            stored.resource = Arc::clone(&resource);
        }

        let Some(owner) = owner else {
            self.offer(&resource);
            return;
        };

        let verdict = match self.observer(owner) {
            Some(observer) => observer.on_updated(&resource),
            None => Ownership::Released,
        };
        if verdict == Ownership::Released {
            self.release(&resource.id);
            self.offer(&resource);
        }
    }

    fn on_deleted(&self, id: &ResourceId) {
        let Some(removed) = self.inner.write().remove(id) else {
            return;
        };
        if let Some(observer) = removed.owner.and_then(|owner| self.observer(owner)) {
            observer.on_removed(id);
        }
    }

    /// Offer an unowned resource to the generators of its type.
    fn offer(&self, resource: &Arc<Resource>) {
        let stage = Stage::added(resource.resource_type);
        let claimed = self
            .queue
            .run(&StageEvent::with_resource(stage, resource.to_ref()));
        if !claimed {
            debug!("resources"; "{} {} unclaimed", resource.resource_type, resource.id);
        }
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    pub fn register_observer(&self, owner: GeneratorId, observer: Weak<dyn ResourceObserver>) {
        self.observers.write().insert(owner, observer);
    }

    pub fn clear_observers(&self) {
        self.observers.write().clear();
    }

    fn observer(&self, owner: GeneratorId) -> Option<Arc<dyn ResourceObserver>> {
        self.observers.read().get(&owner).and_then(Weak::upgrade)
    }

    /// Claim a pending resource. Fails if it is missing or already owned.
    pub fn claim(&self, id: &ResourceId, owner: GeneratorId) -> bool {
        match self.inner.write().entry_mut(id) {
            Some(stored) if stored.owner.is_none() => {
                stored.owner = Some(owner);
                stored.state = ResourceState::Active;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, id: &ResourceId) -> bool {
        match self.inner.write().entry_mut(id) {
            Some(stored) if stored.owner.is_some() => {
                stored.owner = None;
                stored.state = ResourceState::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn owner_of(&self, id: &ResourceId) -> Option<GeneratorId> {
        self.inner.read().entry(id)?.owner
    }

    pub fn state_of(&self, id: &ResourceId) -> Option<ResourceState> {
        self.inner.read().entry(id).map(|s| s.state)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, resource_type: ResourceType, id: &ResourceId) -> Option<Arc<Resource>> {
        let inner = self.inner.read();
        let stored = inner.data.get(&resource_type)?.get(id)?;
        Some(Arc::clone(&stored.resource))
    }

    pub fn get_by_id(&self, id: &ResourceId) -> Option<Arc<Resource>> {
        self.inner.read().entry(id).map(|s| Arc::clone(&s.resource))
    }

    /// All resources of a type, in store order.
    pub fn resources_of(&self, resource_type: ResourceType) -> Vec<Arc<Resource>> {
        self.inner
            .read()
            .data
            .get(&resource_type)
            .map(|list| list.values().map(|s| Arc::clone(&s.resource)).collect())
            .unwrap_or_default()
    }

    /// Unowned resources of a type, in store order.
    pub fn pending_of(&self, resource_type: ResourceType) -> Vec<Arc<Resource>> {
        self.inner
            .read()
            .data
            .get(&resource_type)
            .map(|list| {
                list.values()
                    .filter(|s| s.owner.is_none())
                    .map(|s| Arc::clone(&s.resource))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().types_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Put every resource back to `Pending`.
    pub fn release_all(&self) {
        let mut inner = self.inner.write();
        for stored in inner.data.values_mut().flat_map(IndexMap::values_mut) {
            stored.owner = None;
            stored.state = ResourceState::Pending;
        }
    }

    /// Drop all resources, keep observers and event handling.
    pub fn soft_reset(&self) {
        *self.inner.write() = StoreInner::default();
    }

    /// Drop everything and stop handling events.
    pub fn reset(&self) {
        self.listening.store(false, Ordering::SeqCst);
        self.soft_reset();
        self.clear_observers();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn snapshot(&self) -> ResourceSnapshot {
        let inner = self.inner.read();
        let mut resources = Vec::with_capacity(inner.types_by_id.len());
        for ty in ResourceType::ALL {
            if let Some(list) = inner.data.get(&ty) {
                resources.extend(list.values().map(|s| (*s.resource).clone()));
            }
        }
        ResourceSnapshot {
            fingerprint: String::new(),
            resources,
        }
    }

    /// Replace contents from a snapshot. Ownership is derived from the url
    /// table, whose resource allocation is reused so both stay shared.
    pub fn restore(&self, snapshot: ResourceSnapshot, urls: &UrlTable) {
        let mut inner = StoreInner::default();
        for resource in snapshot.resources {
            let stored = match urls.get_by_resource_id(&resource.id) {
                Some(entry) => StoredResource {
                    resource: entry.resource,
                    state: ResourceState::Active,
                    owner: Some(entry.generator_id),
                },
                None => StoredResource::pending(Arc::new(resource)),
            };
            inner.insert(stored);
        }

        let restored = inner.types_by_id.len();
        *self.inner.write() = inner;
        log!("cache"; "restored {} resources", restored);
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("resources", &self.len())
            .field("observers", &self.observers.read().len())
            .field("listening", &self.is_listening())
            .finish()
    }
}

#[cfg(test)]
mod tests;
