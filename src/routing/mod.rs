//! Routing layer: router kinds, their registry, the mountable tree and the
//! manager that builds all of it from route settings.
//!
//! # Precedence
//!
//! ```text
//! preview, email, unsubscribe   system routes
//! static routes, channels       operator routes (+ feeds)
//! taxonomies                    tag / author archives
//! collections                   entries + listings (+ feeds)
//! static pages                  /:slug/ fallback for pages
//! apps                          weakest
//! ```

mod manager;
mod registry;
mod router;
mod tree;

pub use manager::{RouterConfig, RouterManager, SettingsEvent, SettingsHandler, TIMEZONE_SETTING};
pub use registry::{RegisteredRoute, RouterRegistry};
pub use router::{
    AppRoute, EntrySuffix, Params, Route, RouteKind, RouteMatcher, RoutePattern, Router, RouterId,
};
pub use tree::{Mount, RouteMatch, SiteRouter};
