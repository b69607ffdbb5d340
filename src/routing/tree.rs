//! Mountable router tree handed to the http layer.

use std::sync::Arc;

use super::router::{Params, Route, RouteKind, RouteMatcher, Router, RouterId};
use crate::config::ListingOptions;
use crate::core::UrlPath;
use crate::service::UrlService;
use crate::urls::UrlEntry;

#[derive(Debug, Clone)]
pub struct Mount {
    pub router: Arc<Router>,
    pub routes: Vec<Route>,
}

/// Result of dispatching a request path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub router: RouterId,
    pub router_name: &'static str,
    pub kind: RouteKind,
    pub params: Params,
    /// The owned resource for entry-shaped routes
    pub entry: Option<UrlEntry>,
    /// Channel or collection listing options for listing routes
    pub listing: Option<ListingOptions>,
}

#[derive(Debug, Default)]
pub struct SiteRouter {
    mounts: Vec<Mount>,
}

impl SiteRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, router: Arc<Router>) {
        let routes = router.routes();
        self.mounts.push(Mount { router, routes });
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// First route matching `path`, walking mounts in order.
    ///
    /// Owned routes need the url service: they match only when the
    /// resource served at the path belongs to the mount's router.
    pub fn dispatch(&self, path: &str, service: Option<&UrlService>) -> Option<RouteMatch> {
        let path = UrlPath::from_browser(path);

        for mount in &self.mounts {
            for route in &mount.routes {
                let matched = match &route.matcher {
                    RouteMatcher::Pattern(pattern) => pattern.matches(&path).map(|p| (p, None)),
                    RouteMatcher::Owned { suffix } => {
                        let Some(service) = service else { continue };
                        let Some((base, params)) = suffix.strip(&path) else {
                            continue;
                        };
                        let router_id = mount.router.id();
                        service
                            .get_resource_entry(base.as_str())
                            .ok()
                            .flatten()
                            .filter(|entry| service.owns(router_id.as_str(), &entry.resource.id))
                            .map(|entry| (params, Some(entry)))
                    }
                };

                if let Some((params, entry)) = matched {
                    let listing = match route.kind {
                        RouteKind::Listing => mount.router.listing().cloned(),
                        _ => None,
                    };
                    return Some(RouteMatch {
                        router: mount.router.id(),
                        router_name: mount.router.name(),
                        kind: route.kind.clone(),
                        params,
                        entry,
                        listing,
                    });
                }
            }
        }
        None
    }
}
