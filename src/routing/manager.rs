//! Router manager: builds routers from settings and exposes resolution.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──start──► Building ──url service `init` ended──► Ready
//! ```
//!
//! Queries are defined in every state; before an url service is attached
//! they return the "nothing known" answer.

use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::registry::{RegisteredRoute, RouterRegistry};
use super::router::{AppRoute, Router};
use super::tree::{RouteMatch, SiteRouter};
use crate::config::{RouteSetting, RouteSettings};
use crate::core::{ServiceState, StateCell};
use crate::permalink::PermalinkPattern;
use crate::resource::{Resource, ResourceId};
use crate::service::{
    NOT_FOUND_URL, ResetGeneratorOptions, UrlOptions, UrlService, UrlServiceError,
};
use crate::{debug, log};

/// Settings key whose edit regenerates dated permalinks
pub const TIMEZONE_SETTING: &str = "timezone";

/// A site setting changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEvent {
    pub key: String,
    pub previous: Option<String>,
    pub current: String,
}

impl SettingsEvent {
    pub fn new(key: impl Into<String>, previous: Option<String>, current: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            previous,
            current: current.into(),
        }
    }
}

pub type SettingsHandler =
    Arc<dyn Fn(&RouterManager, &SettingsEvent) -> Result<(), UrlServiceError> + Send + Sync>;

/// What `init` builds from
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub route_settings: Option<RouteSettings>,
    pub url_service: Arc<UrlService>,
    /// Mount `/email/:uuid/`
    pub email: bool,
    pub apps: Vec<AppRoute>,
}

impl RouterConfig {
    pub fn new(url_service: Arc<UrlService>) -> Self {
        Self {
            route_settings: None,
            url_service,
            email: false,
            apps: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: RouteSettings) -> Self {
        self.route_settings = Some(settings);
        self
    }

    pub fn with_email(mut self, email: bool) -> Self {
        self.email = email;
        self
    }

    pub fn with_apps(mut self, apps: Vec<AppRoute>) -> Self {
        self.apps = apps;
        self
    }
}

pub struct RouterManager {
    registry: RouterRegistry,
    service: RwLock<Option<Arc<UrlService>>>,
    site_router: RwLock<Arc<SiteRouter>>,
    state: Arc<StateCell>,
    settings_handlers: RwLock<FxHashMap<String, Vec<SettingsHandler>>>,
    email: RwLock<bool>,
    apps: RwLock<Vec<AppRoute>>,
}

impl Default for RouterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterManager {
    pub fn new() -> Self {
        let manager = Self {
            registry: RouterRegistry::new(),
            service: RwLock::new(None),
            site_router: RwLock::new(Arc::new(SiteRouter::new())),
            state: Arc::new(StateCell::new()),
            settings_handlers: RwLock::new(FxHashMap::default()),
            email: RwLock::new(false),
            apps: RwLock::new(Vec::new()),
        };
        manager.on_settings_edited(TIMEZONE_SETTING, |manager, event| {
            manager.handle_timezone_edit(event).map(|_| ())
        });
        manager
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    pub fn registry(&self) -> &RouterRegistry {
        &self.registry
    }

    pub fn url_service(&self) -> Option<Arc<UrlService>> {
        self.service.read().clone()
    }

    pub fn site_router(&self) -> Arc<SiteRouter> {
        Arc::clone(&*self.site_router.read())
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Reset routers, attach the url service and build from settings.
    ///
    /// A service that already carries generators is being re-routed: its
    /// generators and urls are dropped and its resources released, so the
    /// new routers claim them on the next `init` stage (see [`Self::reload`]).
    pub fn init(&self, config: RouterConfig) -> Arc<SiteRouter> {
        self.registry.reset_all_routers();
        self.registry.reset_all_routes();
        self.state.set(ServiceState::Uninitialized);

        let stale = config.url_service.generators().len();
        if stale > 0 {
            debug!("routing"; "dropping {} generators of the previous routers", stale);
            config.url_service.reset_generators(ResetGeneratorOptions {
                release_resources_only: true,
            });
        }

        *self.service.write() = Some(config.url_service);
        *self.email.write() = config.email;
        *self.apps.write() = config.apps;
        *self.site_router.write() = Arc::new(SiteRouter::new());

        if let Some(settings) = config.route_settings {
            self.start(&settings);
        }
        self.site_router()
    }

    /// Rebuild the routers from new settings and regenerate every url.
    pub async fn reload(&self, config: RouterConfig) -> Arc<SiteRouter> {
        let router = self.init(config);
        if let Some(service) = self.url_service()
            && service.reload().await
        {
            log!("routing"; "reloaded, {} urls", service.urls().len());
        }
        router
    }

    /// Build every router in precedence order and mount it.
    pub fn start(&self, settings: &RouteSettings) {
        self.state.set(ServiceState::Building);
        let mut tree = SiteRouter::new();

        let mut system = vec![Router::Preview];
        if *self.email.read() {
            system.push(Router::Email);
        }
        system.push(Router::Unsubscribe);
        for router in system {
            self.register(&mut tree, router);
        }

        for (route, setting) in &settings.routes {
            let router = match setting {
                RouteSetting::Template { templates } => Router::StaticRoute {
                    route: route.clone(),
                    templates: templates.clone(),
                },
                RouteSetting::Channel(channel) => Router::Channel {
                    route: route.clone(),
                    filter: channel.filter.clone(),
                    listing: channel.listing.clone(),
                    rss: channel.rss,
                },
            };
            self.register_with_feed(&mut tree, router);
        }

        for (key, permalink) in &settings.taxonomies {
            self.register(
                &mut tree,
                Router::Taxonomy {
                    key: *key,
                    permalink: permalink.clone(),
                },
            );
        }

        for (route, collection) in &settings.collections {
            self.register_with_feed(
                &mut tree,
                Router::Collection {
                    route: route.clone(),
                    permalink: collection.permalink.clone(),
                    filter: collection.filter.clone(),
                    listing: collection.listing.clone(),
                    rss: collection.rss,
                },
            );
        }

        if let Ok(permalink) = PermalinkPattern::parse("/:slug/") {
            self.register(&mut tree, Router::StaticPages { permalink });
        }

        let apps = self.apps.read().clone();
        if !apps.is_empty() {
            self.register(&mut tree, Router::Apps { routes: apps });
        }

        *self.site_router.write() = Arc::new(tree);

        let state = Arc::clone(&self.state);
        if let Some(service) = self.url_service() {
            service.on_finished(move || {
                if state.advance(ServiceState::Building, ServiceState::Ready) {
                    log!("routing"; "ready");
                }
            });
        }

        log!("routing"; "{} routers, {} routes", self.registry.routers().len(), self.registry.get_all_routes().len());
    }

    fn register_with_feed(&self, tree: &mut SiteRouter, router: Router) {
        let feed = router.rss_router();
        self.register(tree, router);
        if let Some(feed) = feed {
            self.register(tree, feed);
        }
    }

    fn register(&self, tree: &mut SiteRouter, router: Router) {
        let router = Arc::new(router);
        for route in router.routes() {
            self.registry
                .set_route(router.name(), route.describe(router.permalinks()));
        }
        self.registry.set_router(Arc::clone(&router));
        self.router_created(&router);
        tree.mount(router);
    }

    /// Give routers with a permalink their url generator.
    pub fn router_created(&self, router: &Router) {
        let Some(spec) = router.generator_spec() else {
            return;
        };
        match self.url_service() {
            Some(service) => {
                service.on_router_added(spec);
            }
            None => debug!("routing"; "no url service, {} has no generator", router.id()),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub fn owns(&self, router_id: &str, id: &ResourceId) -> bool {
        self.url_service()
            .is_some_and(|service| service.owns(router_id, id))
    }

    pub fn get_url_by_resource_id(&self, id: &ResourceId, options: UrlOptions) -> String {
        match self.url_service() {
            Some(service) => service.get_url_by_resource_id(id, options),
            None => NOT_FOUND_URL.to_string(),
        }
    }

    pub fn get_resource_by_id(&self, id: &ResourceId) -> Result<Arc<Resource>, UrlServiceError> {
        match self.url_service() {
            Some(service) => service.get_resource_by_id(id),
            None => Err(UrlServiceError::ResourceNotFound(id.clone())),
        }
    }

    /// Resource served at `url`. Not-ready while unmapped urls are still
    /// being generated.
    pub fn get_resource(&self, url: &str) -> Result<Option<Arc<Resource>>, UrlServiceError> {
        self.url_service()
            .ok_or(UrlServiceError::NotReady)?
            .get_resource(url)
    }

    pub fn get_rss_url(&self, options: UrlOptions) -> Option<String> {
        let url = self.registry.get_rss_url()?;
        let service = self.url_service()?;
        Some(if options.absolute || options.with_subdirectory {
            service.utils().create_url(&url, options.absolute)
        } else {
            url
        })
    }

    pub fn get_all_routes(&self) -> Vec<RegisteredRoute> {
        self.registry.get_all_routes()
    }

    /// First route matching a request path.
    pub fn dispatch(&self, path: &str) -> Option<RouteMatch> {
        let service = self.url_service();
        self.site_router().dispatch(path, service.as_deref())
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn on_settings_edited<F>(&self, key: &str, handler: F)
    where
        F: Fn(&RouterManager, &SettingsEvent) -> Result<(), UrlServiceError> + Send + Sync + 'static,
    {
        self.settings_handlers
            .write()
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every handler registered for the event's key.
    pub fn notify_settings(&self, event: &SettingsEvent) -> Result<(), UrlServiceError> {
        let handlers = self
            .settings_handlers
            .read()
            .get(&event.key)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(self, event)?;
        }
        Ok(())
    }

    /// Regenerate collections with date tokens in the new timezone.
    ///
    /// Returns the number of rewritten urls.
    pub fn handle_timezone_edit(&self, event: &SettingsEvent) -> Result<usize, UrlServiceError> {
        if event.previous.as_deref() == Some(event.current.as_str()) {
            return Ok(0);
        }
        let tz: Tz = event
            .current
            .parse()
            .map_err(|_| UrlServiceError::Timezone(event.current.clone()))?;

        let Some(service) = self.url_service() else {
            return Ok(0);
        };
        if !service.set_timezone(tz) {
            return Ok(0);
        }

        let mut regenerated = 0;
        for router in self.registry.get_routers_by_name("CollectionRouter") {
            if router.permalinks().is_some_and(PermalinkPattern::has_date_token) {
                regenerated += service.on_router_updated(router.id().as_str())?;
            }
        }

        log!("routing"; "timezone {}, {} urls regenerated", tz, regenerated);
        Ok(regenerated)
    }
}

impl std::fmt::Debug for RouterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterManager")
            .field("state", &self.state())
            .field("routers", &self.registry.routers().len())
            .finish()
    }
}
