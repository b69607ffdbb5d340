//! Url generators: one per router with a permalink.
//!
//! A generator claims the resources its filter matches and writes their
//! expanded permalinks to the url table. It never touches resources owned
//! by another generator.
//!
//! ```text
//! queue `init`          ──► on_init   ──► claim every pending match
//! queue `added:<type>`  ──► on_added  ──► claim one resource (Flow::Stop)
//! store observer        ──► on_updated / on_removed for owned resources
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::core::{SiteTimezone, UrlPath};
use crate::debug;
use crate::filter::Filter;
use crate::permalink::PermalinkPattern;
use crate::queue::{Flow, Queue, Stage, StageEvent};
use crate::resource::{
    Ownership, Resource, ResourceId, ResourceObserver, ResourceStore, ResourceType,
};
use crate::routing::RouterId;
use crate::urls::{UrlEntry, UrlTable};

/// Generator identity, equal to its registration position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratorId(pub u32);

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a router hands over to get a generator
#[derive(Debug, Clone)]
pub struct GeneratorSpec {
    pub identifier: RouterId,
    pub filter: Filter,
    pub resource_type: ResourceType,
    pub permalink: PermalinkPattern,
}

pub struct UrlGenerator {
    uid: GeneratorId,
    spec: GeneratorSpec,
    store: Arc<ResourceStore>,
    urls: Arc<UrlTable>,
    timezone: Arc<SiteTimezone>,
}

impl UrlGenerator {
    pub fn new(
        position: u32,
        spec: GeneratorSpec,
        store: Arc<ResourceStore>,
        urls: Arc<UrlTable>,
        timezone: Arc<SiteTimezone>,
    ) -> Self {
        Self {
            uid: GeneratorId(position),
            spec,
            store,
            urls,
            timezone,
        }
    }

    /// Subscribe to the queue and register as owner-side observer.
    pub fn attach(self: &Arc<Self>, queue: &Queue) {
        let weak = Arc::downgrade(self);
        queue.subscribe(Stage::INIT, move |_| {
            if let Some(generator) = weak.upgrade() {
                generator.on_init();
            }
            Flow::Continue
        });

        let weak = Arc::downgrade(self);
        queue.subscribe(&Stage::added(self.spec.resource_type), move |event| {
            weak.upgrade()
                .map_or(Flow::Continue, |generator| generator.on_added(event))
        });

        let observer: Weak<dyn ResourceObserver> = Arc::downgrade(self) as Weak<dyn ResourceObserver>;
        self.store.register_observer(self.uid, observer);
    }

    pub fn uid(&self) -> GeneratorId {
        self.uid
    }

    pub fn position(&self) -> u32 {
        self.uid.0
    }

    pub fn identifier(&self) -> &RouterId {
        &self.spec.identifier
    }

    pub fn filter(&self) -> &Filter {
        &self.spec.filter
    }

    pub fn resource_type(&self) -> ResourceType {
        self.spec.resource_type
    }

    pub fn permalink(&self) -> &PermalinkPattern {
        &self.spec.permalink
    }

    /// First pass: claim every pending resource that matches, in store order.
    fn on_init(&self) {
        let mut claimed = 0;
        for resource in self.store.pending_of(self.spec.resource_type) {
            if self.try_claim(&resource) {
                claimed += 1;
            }
        }
        debug!("generator"; "{} {} claimed {} {}", self.uid, self.spec.identifier, claimed, self.spec.resource_type);
    }

    fn on_added(&self, event: &StageEvent) -> Flow {
        let Some(resource) = event
            .resource
            .as_ref()
            .and_then(|r| self.store.get(r.resource_type, &r.id))
        else {
            return Flow::Continue;
        };

        if self.try_claim(&resource) {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn try_claim(&self, resource: &Arc<Resource>) -> bool {
        if !self.spec.filter.matches(resource) || !self.store.claim(&resource.id, self.uid) {
            return false;
        }
        self.write_url(resource);
        true
    }

    fn write_url(&self, resource: &Arc<Resource>) {
        let url = self.url_for(resource);
        self.urls.add(UrlEntry {
            url,
            generator_id: self.uid,
            resource: Arc::clone(resource),
        });
    }

    /// Expand the permalink for a resource in the current site timezone.
    pub fn url_for(&self, resource: &Resource) -> UrlPath {
        self.spec.permalink.expand(resource, self.timezone.get())
    }

    /// Rewrite the urls of every owned resource.
    pub fn regenerate_resources(&self) -> usize {
        let owned = self.urls.get_by_generator_id(self.uid);
        let count = owned.len();
        for entry in owned {
            let resource = self
                .store
                .get_by_id(&entry.resource.id)
                .unwrap_or(entry.resource);
            self.urls.remove_resource_id(&resource.id);
            self.write_url(&resource);
        }
        debug!("generator"; "{} {} regenerated {} urls", self.uid, self.spec.identifier, count);
        count
    }

    /// Whether this generator owns the resource.
    pub fn has_id(&self, id: &ResourceId) -> bool {
        self.store.owner_of(id) == Some(self.uid)
    }
}

impl ResourceObserver for UrlGenerator {
    fn on_updated(&self, resource: &Arc<Resource>) -> Ownership {
        self.urls.remove_resource_id(&resource.id);
        if self.spec.filter.matches(resource) {
            self.write_url(resource);
            Ownership::Retained
        } else {
            Ownership::Released
        }
    }

    fn on_removed(&self, id: &ResourceId) {
        self.urls.remove_resource_id(id);
    }
}

impl fmt::Debug for UrlGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlGenerator")
            .field("uid", &self.uid)
            .field("identifier", &self.spec.identifier)
            .field("resource_type", &self.spec.resource_type)
            .field("filter", &self.spec.filter.as_str())
            .field("permalink", &self.spec.permalink.as_str())
            .finish()
    }
}
