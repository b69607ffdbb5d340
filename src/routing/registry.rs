//! Ordered collection of active routers.
//!
//! Registration order is precedence order; nothing here ever reorders.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::router::{Router, RouterId};
use crate::core::UrlPath;

/// A route as registered, for debugging and the `routes` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRoute {
    pub router: &'static str,
    pub route: String,
}

#[derive(Debug, Default)]
pub struct RouterRegistry {
    routers: RwLock<IndexMap<RouterId, Arc<Router>>>,
    routes: RwLock<Vec<RegisteredRoute>>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_route(&self, router: &'static str, route: impl Into<String>) {
        self.routes.write().push(RegisteredRoute {
            router,
            route: route.into(),
        });
    }

    /// Register a router. Re-registering an id keeps its original position.
    pub fn set_router(&self, router: Arc<Router>) {
        self.routers.write().insert(router.id(), router);
    }

    pub fn get_all_routes(&self) -> Vec<RegisteredRoute> {
        self.routes.read().clone()
    }

    pub fn get_router(&self, id: &str) -> Option<Arc<Router>> {
        self.routers.read().get(id).cloned()
    }

    /// First router of a kind, e.g. `CollectionRouter`.
    pub fn get_router_by_name(&self, name: &str) -> Option<Arc<Router>> {
        self.routers
            .read()
            .values()
            .find(|r| r.name() == name)
            .cloned()
    }

    pub fn get_routers_by_name(&self, name: &str) -> Vec<Arc<Router>> {
        self.routers
            .read()
            .values()
            .filter(|r| r.name() == name)
            .cloned()
            .collect()
    }

    /// All routers in registration order.
    pub fn routers(&self) -> Vec<Arc<Router>> {
        self.routers.read().values().cloned().collect()
    }

    /// Site feed: the index collection's, else the only feed-enabled
    /// collection's.
    pub fn get_rss_url(&self) -> Option<String> {
        let collections = self.get_routers_by_name("CollectionRouter");
        let root = UrlPath::from_page("/");

        let index = collections
            .iter()
            .find(|r| matches!(r.as_ref(), Router::Collection { route, .. } if *route == root));
        if let Some(index) = index {
            return index.rss_url();
        }

        let mut feeds = collections.iter().filter_map(|r| r.rss_url());
        match (feeds.next(), feeds.next()) {
            (Some(url), None) => Some(url),
            _ => None,
        }
    }

    pub fn reset_all_routes(&self) {
        self.routes.write().clear();
    }

    pub fn reset_all_routers(&self) {
        self.routers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListingOptions;
    use crate::filter::Filter;
    use crate::permalink::PermalinkPattern;

    fn collection(route: &str, rss: bool) -> Arc<Router> {
        Arc::new(Router::Collection {
            route: UrlPath::from_page(route),
            permalink: PermalinkPattern::parse(&format!("{route}:slug/")).unwrap(),
            filter: Filter::all(),
            listing: ListingOptions::default(),
            rss,
        })
    }

    #[test]
    fn test_lookup_by_name_keeps_order() {
        let registry = RouterRegistry::new();
        registry.set_router(Arc::new(Router::Preview));
        registry.set_router(collection("/blog/", true));
        registry.set_router(collection("/", true));

        assert_eq!(registry.routers().len(), 3);
        let first = registry.get_router_by_name("CollectionRouter").unwrap();
        assert_eq!(first.id().as_str(), "collection:/blog/");
        assert_eq!(registry.get_routers_by_name("CollectionRouter").len(), 2);
        assert!(registry.get_router("preview").is_some());
        assert!(registry.get_router("apps").is_none());
    }

    #[test]
    fn test_rss_url_prefers_index() {
        let registry = RouterRegistry::new();
        registry.set_router(collection("/blog/", true));
        registry.set_router(collection("/", true));
        assert_eq!(registry.get_rss_url().as_deref(), Some("/rss/"));

        registry.reset_all_routers();
        registry.set_router(collection("/blog/", true));
        registry.set_router(collection("/news/", false));
        assert_eq!(registry.get_rss_url().as_deref(), Some("/blog/rss/"));

        registry.set_router(collection("/more/", true));
        assert_eq!(registry.get_rss_url(), None);
    }

    #[test]
    fn test_routes_reset() {
        let registry = RouterRegistry::new();
        registry.set_route("PreviewRouter", "/p/:uuid/");
        assert_eq!(registry.get_all_routes()[0].route, "/p/:uuid/");
        registry.reset_all_routes();
        assert!(registry.get_all_routes().is_empty());
    }
}
