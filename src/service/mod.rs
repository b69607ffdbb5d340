//! The url service: owns the queue, resource store, url table and
//! generators, and answers lookups in both directions.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► on_router_added × N ──► init(source) ──► finished
//!                                   │
//!                                   ├─ cache hit:  restore snapshots
//!                                   └─ cache miss: fetch ──► queue `init`
//! ```
//!
//! Lookups by url fail with [`UrlServiceError::NotReady`] until `init`
//! finished; afterwards an unmapped url is simply absent.

mod error;

pub use error::UrlServiceError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono_tz::Tz;
use parking_lot::RwLock;

use crate::cache::{CacheKind, LocalFileCache, fingerprint};
use crate::core::{SiteTimezone, UrlPath, UrlUtils, url_join};
use crate::generator::{GeneratorSpec, UrlGenerator};
use crate::queue::{Queue, Stage, StageOptions};
use crate::resource::{
    Resource, ResourceConfig, ResourceId, ResourceSnapshot, ResourceSource, ResourceStore,
};
use crate::urls::{UrlEntry, UrlSnapshot, UrlTable};
use crate::{debug, debug_do, log};

/// Returned for resources without a url
pub const NOT_FOUND_URL: &str = "/404/";

/// Construction options
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub utils: UrlUtils,
    pub timezone: Tz,
    pub init_tolerance: Duration,
    pub required_subscribers: usize,
    pub resource_config: ResourceConfig,
    pub cache: Option<LocalFileCache>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            utils: UrlUtils::default(),
            timezone: Tz::UTC,
            init_tolerance: Duration::from_millis(100),
            required_subscribers: 1,
            resource_config: ResourceConfig::default(),
            cache: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Try the persistent cache before fetching
    pub url_cache: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlOptions {
    /// Origin + subdirectory + path
    pub absolute: bool,
    /// Subdirectory + path
    pub with_subdirectory: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PermalinkOptions {
    /// Append the optional `edit` suffix
    pub with_url_options: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    pub keep_listeners: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetGeneratorOptions {
    pub release_resources_only: bool,
}

pub type FinishedHook = Arc<dyn Fn() + Send + Sync>;

pub struct UrlService {
    queue: Arc<Queue>,
    store: Arc<ResourceStore>,
    urls: Arc<UrlTable>,
    timezone: Arc<SiteTimezone>,
    generators: RwLock<Vec<Arc<UrlGenerator>>>,
    finished: AtomicBool,
    finished_hooks: RwLock<Vec<FinishedHook>>,
    cache: Option<LocalFileCache>,
    init_tolerance: Duration,
    required_subscribers: usize,
}

impl UrlService {
    pub fn new(options: ServiceOptions) -> Self {
        let queue = Arc::new(Queue::new());
        let store = Arc::new(ResourceStore::new(Arc::clone(&queue)));
        store.init_resource_config(options.resource_config);

        Self {
            queue,
            store,
            urls: Arc::new(UrlTable::new(options.utils)),
            timezone: Arc::new(SiteTimezone::new(options.timezone)),
            generators: RwLock::new(Vec::new()),
            finished: AtomicBool::new(false),
            finished_hooks: RwLock::new(Vec::new()),
            cache: options.cache,
            init_tolerance: options.init_tolerance,
            required_subscribers: options.required_subscribers,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn urls(&self) -> &Arc<UrlTable> {
        &self.urls
    }

    pub fn utils(&self) -> &UrlUtils {
        self.urls.utils()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone.get()
    }

    /// Replace the site timezone. Returns `true` if it changed.
    ///
    /// Existing urls are untouched; callers regenerate dated routers.
    pub fn set_timezone(&self, tz: Tz) -> bool {
        self.timezone.set(tz)
    }

    pub fn generators(&self) -> Vec<Arc<UrlGenerator>> {
        self.generators.read().clone()
    }

    fn generator_for(&self, identifier: &str) -> Option<Arc<UrlGenerator>> {
        self.generators
            .read()
            .iter()
            .find(|g| g.identifier().as_str() == identifier)
            .cloned()
    }

    // ========================================================================
    // Routers
    // ========================================================================

    /// Create, attach and register a generator for a router.
    pub fn on_router_added(&self, spec: GeneratorSpec) -> Arc<UrlGenerator> {
        let mut generators = self.generators.write();
        let position = generators.len() as u32;
        let generator = Arc::new(UrlGenerator::new(
            position,
            spec,
            Arc::clone(&self.store),
            Arc::clone(&self.urls),
            Arc::clone(&self.timezone),
        ));
        generator.attach(&self.queue);
        generators.push(Arc::clone(&generator));

        debug!("routing"; "generator {} for {} ({})", generator.uid(), generator.identifier(), generator.permalink());
        generator
    }

    /// Regenerate every url of the router's generator.
    pub fn on_router_updated(&self, identifier: &str) -> Result<usize, UrlServiceError> {
        let generator = self
            .generator_for(identifier)
            .ok_or_else(|| UrlServiceError::UnknownRouter(identifier.to_string()))?;
        Ok(generator.regenerate_resources())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn has_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Entry served at `url`, resolving collisions by generator position.
    pub fn get_resource_entry(&self, url: &str) -> Result<Option<UrlEntry>, UrlServiceError> {
        let url = UrlPath::from_page(url);
        let entries = self.urls.get_by_url(&url);

        if entries.is_empty() {
            if !self.has_finished() {
                return Err(UrlServiceError::NotReady);
            }
            return Ok(None);
        }

        if entries.len() > 1 {
            debug!("urls"; "{} claimed by {} resources", url, entries.len());
        }
        Ok(entries.into_iter().min_by_key(|e| e.generator_id))
    }

    pub fn get_resource(&self, url: &str) -> Result<Option<Arc<Resource>>, UrlServiceError> {
        Ok(self.get_resource_entry(url)?.map(|e| e.resource))
    }

    pub fn get_resource_by_id(&self, id: &ResourceId) -> Result<Arc<Resource>, UrlServiceError> {
        self.urls
            .get_by_resource_id(id)
            .map(|e| e.resource)
            .ok_or_else(|| UrlServiceError::ResourceNotFound(id.clone()))
    }

    /// Url of a resource, or `/404/` when it has none.
    pub fn get_url_by_resource_id(&self, id: &ResourceId, options: UrlOptions) -> String {
        let url = self
            .urls
            .get_by_resource_id(id)
            .map_or_else(|| NOT_FOUND_URL.to_string(), |e| e.url.to_string());

        if options.absolute {
            self.utils().create_url(&url, true)
        } else if options.with_subdirectory {
            self.utils().create_url(&url, false)
        } else {
            url
        }
    }

    /// Whether the router's generator owns the resource.
    pub fn owns(&self, router_id: &str, id: &ResourceId) -> bool {
        self.generators
            .read()
            .iter()
            .filter(|g| g.identifier().as_str() == router_id)
            .any(|g| g.has_id(id))
    }

    /// Permalink pattern of the generator serving `url`.
    pub fn get_permalink_by_url(
        &self,
        url: &str,
        options: PermalinkOptions,
    ) -> Result<Option<String>, UrlServiceError> {
        let Some(entry) = self.get_resource_entry(url)? else {
            return Ok(None);
        };
        let generators = self.generators.read();
        let Some(generator) = generators.iter().find(|g| g.uid() == entry.generator_id) else {
            return Ok(None);
        };

        let permalink = generator.permalink();
        Ok(Some(if options.with_url_options {
            permalink.with_url_options()
        } else {
            url_join(&[permalink.as_str()])
        }))
    }

    // ========================================================================
    // Init / shutdown
    // ========================================================================

    /// Run `hook` once init finished (immediately if it already has).
    pub fn on_finished<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hook: FinishedHook = Arc::new(hook);
        self.finished_hooks.write().push(Arc::clone(&hook));
        if self.has_finished() {
            hook();
        }
    }

    fn mark_finished(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = self.finished_hooks.read().clone();
        for hook in hooks {
            hook();
        }
    }

    /// Fingerprint of the current generator topology and timezone.
    pub fn fingerprint(&self) -> String {
        let generators = self.generators.read();
        fingerprint(generators.iter().map(Arc::as_ref), self.timezone())
    }

    /// Populate the url table, from cache or from the source.
    pub async fn init<S: ResourceSource>(
        &self,
        source: &S,
        options: InitOptions,
    ) -> Result<(), UrlServiceError> {
        if options.url_cache && self.restore_from_cache().await {
            self.store.init_event_listeners(source);
            self.mark_finished();
            log!("ready"; "{} urls restored from cache", self.urls.len());
            return Ok(());
        }

        let fetched = self.store.fetch_resources(source).await?;
        log!("init"; "{} resources fetched", fetched);
        self.store.init_event_listeners(source);

        self.run_init_stage().await;
        Ok(())
    }

    /// Re-run the `init` stage over the resources already in the store.
    ///
    /// Used after the routers were rebuilt on top of released resources.
    /// Returns `false` if a reset cancelled the stage.
    pub async fn reload(&self) -> bool {
        self.run_init_stage().await
    }

    async fn run_init_stage(&self) -> bool {
        let completed = self
            .queue
            .start(StageOptions {
                stage: Stage::INIT.to_string(),
                tolerance: self.init_tolerance,
                required_subscribers: self.required_subscribers,
            })
            .await;

        if completed {
            self.mark_finished();
            log!("ready"; "{} urls from {} generators", self.urls.len(), self.generators.read().len());
            debug_do! {
                for conflict in self.urls.conflicts() {
                    debug!("urls"; "{} claimed by {} resources", conflict.url, conflict.claims.len());
                }
            }
        }
        completed
    }

    async fn restore_from_cache(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };

        let urls: Option<UrlSnapshot> = cache.read(CacheKind::Urls).await;
        let resources: Option<ResourceSnapshot> = cache.read(CacheKind::Resources).await;
        let (Some(urls), Some(resources)) = (urls, resources) else {
            return false;
        };

        let expected = self.fingerprint();
        if urls.fingerprint != expected || resources.fingerprint != expected {
            debug!("persist"; "fingerprint mismatch, rebuilding");
            return false;
        }

        self.urls.restore(urls);
        self.store.restore(resources, &self.urls);
        true
    }

    /// Persist both snapshots when a cache is configured.
    pub async fn shutdown(&self) -> std::io::Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        if !self.has_finished() {
            debug!("persist"; "init not finished, skipping snapshot");
            return Ok(());
        }

        let fingerprint = self.fingerprint();
        let urls = UrlSnapshot {
            fingerprint: fingerprint.clone(),
            ..self.urls.snapshot()
        };
        let resources = ResourceSnapshot {
            fingerprint,
            ..self.store.snapshot()
        };

        cache.write(CacheKind::Urls, &urls).await?;
        cache.write(CacheKind::Resources, &resources).await
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Drop generators, urls, queue state and resources.
    pub fn reset(&self, options: ResetOptions) {
        self.generators.write().clear();
        self.urls.reset();
        self.queue.reset();
        if options.keep_listeners {
            self.store.soft_reset();
            self.store.clear_observers();
        } else {
            self.store.reset();
        }
        self.finished.store(false, Ordering::SeqCst);
        self.finished_hooks.write().clear();
    }

    /// Drop generators and urls; keep resources, either released or cleared.
    pub fn reset_generators(&self, options: ResetGeneratorOptions) {
        self.finished.store(false, Ordering::SeqCst);
        self.generators.write().clear();
        self.urls.reset();
        self.queue.reset();
        self.store.clear_observers();
        if options.release_resources_only {
            self.store.release_all();
        } else {
            self.store.soft_reset();
        }
    }

    /// Clear urls, pending stages and resources; generators stay attached.
    pub fn soft_reset(&self) {
        self.finished.store(false, Ordering::SeqCst);
        self.urls.reset();
        self.queue.soft_reset();
        self.store.soft_reset();
    }
}

impl std::fmt::Debug for UrlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlService")
            .field("generators", &self.generators.read().len())
            .field("urls", &self.urls.len())
            .field("finished", &self.has_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests;
