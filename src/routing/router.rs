//! Router kinds and the routes each one serves.
//!
//! Routes come in two shapes:
//! - `Pattern`: a fixed path template like `/tag/:slug/page/:page/`
//! - `Owned`: any url the router's generator owns, optionally with a
//!   `page/N/`, `rss/` or `edit/` suffix

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{ListingOptions, TaxonomyKey};
use crate::core::{UrlPath, url_join};
use crate::filter::Filter;
use crate::generator::GeneratorSpec;
use crate::permalink::PermalinkPattern;
use crate::resource::ResourceType;

/// Stable router identifier, e.g. `collection:/` or `taxonomy:tag`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterId(Arc<str>);

impl RouterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RouterId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Route patterns
// ============================================================================

/// Captured route parameters, in pattern order
pub type Params = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    /// `:page`, digits only
    Page,
}

/// Path template with `:name` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Self {
        let source = UrlPath::from_page(pattern).as_str().to_string();
        let segments = source
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some("page") => Segment::Page,
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { source, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a normalized path, returning captured params.
    pub fn matches(&self, path: &UrlPath) -> Option<Params> {
        let parts: Vec<&str> = path.segments().collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(text) if text == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
                Segment::Page => {
                    if !is_page_number(part) {
                        return None;
                    }
                    params.insert("page".to_string(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn is_page_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// Routes
// ============================================================================

/// What a matched route serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Paginated listing (collection index, channel, taxonomy archive)
    Listing,
    /// Single resource page
    Entry,
    Rss,
    /// Redirect to the admin editor
    Edit,
    /// Static template page
    Template(String),
    Preview,
    Email,
    Unsubscribe,
    /// Route mounted by an app
    App(String),
}

/// Suffix after an owned url
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySuffix {
    None,
    /// `page/N/`
    Page,
    /// `rss/`
    Rss,
    /// `edit/`
    Edit,
}

impl EntrySuffix {
    /// Split a path into the owned url and the captured page number.
    pub fn strip(&self, path: &UrlPath) -> Option<(UrlPath, Params)> {
        let parts: Vec<&str> = path.segments().collect();
        let mut params = Params::new();
        let keep = match self {
            Self::None => parts.len(),
            Self::Rss | Self::Edit => {
                let word = if *self == Self::Rss { "rss" } else { "edit" };
                if parts.last() != Some(&word) {
                    return None;
                }
                parts.len() - 1
            }
            Self::Page => {
                let [.., "page", number] = parts.as_slice() else {
                    return None;
                };
                if !is_page_number(number) {
                    return None;
                }
                params.insert("page".to_string(), number.to_string());
                parts.len() - 2
            }
        };

        if keep == 0 && *self != Self::None {
            return None;
        }
        Some((UrlPath::from_page(&parts[..keep].join("/")), params))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Page => "page/:page/",
            Self::Rss => "rss/",
            Self::Edit => "edit/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatcher {
    Pattern(RoutePattern),
    Owned { suffix: EntrySuffix },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: RouteKind,
    pub matcher: RouteMatcher,
}

impl Route {
    fn pattern(kind: RouteKind, pattern: &str) -> Self {
        Self {
            kind,
            matcher: RouteMatcher::Pattern(RoutePattern::parse(pattern)),
        }
    }

    fn owned(kind: RouteKind, suffix: EntrySuffix) -> Self {
        Self {
            kind,
            matcher: RouteMatcher::Owned { suffix },
        }
    }

    /// Human readable form, `{permalink}` standing for owned urls.
    pub fn describe(&self, permalink: Option<&PermalinkPattern>) -> String {
        match &self.matcher {
            RouteMatcher::Pattern(pattern) => pattern.as_str().to_string(),
            RouteMatcher::Owned { suffix } => {
                let base = permalink.map_or("{permalink}", PermalinkPattern::as_str);
                url_join(&[base, suffix.label()])
            }
        }
    }
}

/// Route registered by an app, weakest precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRoute {
    pub app: String,
    pub path: String,
}

// ============================================================================
// Routers
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Router {
    Preview,
    Email,
    Unsubscribe,
    StaticRoute {
        route: UrlPath,
        templates: Vec<String>,
    },
    Channel {
        route: UrlPath,
        filter: Filter,
        listing: ListingOptions,
        rss: bool,
    },
    Taxonomy {
        key: TaxonomyKey,
        permalink: PermalinkPattern,
    },
    Collection {
        route: UrlPath,
        permalink: PermalinkPattern,
        filter: Filter,
        listing: ListingOptions,
        rss: bool,
    },
    StaticPages {
        permalink: PermalinkPattern,
    },
    /// Feed of a channel or collection
    Rss {
        parent: RouterId,
        route: UrlPath,
    },
    Apps {
        routes: Vec<AppRoute>,
    },
}

impl Router {
    pub fn id(&self) -> RouterId {
        RouterId::new(match self {
            Self::Preview => "preview".to_string(),
            Self::Email => "email".to_string(),
            Self::Unsubscribe => "unsubscribe".to_string(),
            Self::StaticRoute { route, .. } => format!("route:{route}"),
            Self::Channel { route, .. } => format!("channel:{route}"),
            Self::Taxonomy { key, .. } => format!("taxonomy:{key}"),
            Self::Collection { route, .. } => format!("collection:{route}"),
            Self::StaticPages { .. } => "static-pages".to_string(),
            Self::Rss { route, .. } => format!("rss:{}", url_join(&[route.as_str(), "rss/"])),
            Self::Apps { .. } => "apps".to_string(),
        })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Preview => "PreviewRouter",
            Self::Email => "EmailRouter",
            Self::Unsubscribe => "UnsubscribeRouter",
            Self::StaticRoute { .. } => "StaticRoutesRouter",
            Self::Channel { .. } => "ChannelRouter",
            Self::Taxonomy { .. } => "TaxonomyRouter",
            Self::Collection { .. } => "CollectionRouter",
            Self::StaticPages { .. } => "StaticPagesRouter",
            Self::Rss { .. } => "RSSRouter",
            Self::Apps { .. } => "AppRouter",
        }
    }

    /// Permalink of routers that own resource urls.
    pub fn permalinks(&self) -> Option<&PermalinkPattern> {
        match self {
            Self::Taxonomy { permalink, .. }
            | Self::Collection { permalink, .. }
            | Self::StaticPages { permalink } => Some(permalink),
            _ => None,
        }
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::Taxonomy { key, .. } => Some(key.resource_type()),
            Self::Collection { .. } | Self::Channel { .. } => Some(ResourceType::Posts),
            Self::StaticPages { .. } => Some(ResourceType::Pages),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Self::Collection { filter, .. } | Self::Channel { filter, .. } => Some(filter),
            _ => None,
        }
    }

    /// Template, limit and order of listing routers.
    pub fn listing(&self) -> Option<&ListingOptions> {
        match self {
            Self::Channel { listing, .. } | Self::Collection { listing, .. } => Some(listing),
            _ => None,
        }
    }

    /// Feed url of channels and collections with rss enabled.
    pub fn rss_url(&self) -> Option<String> {
        match self {
            Self::Channel { route, rss: true, .. } | Self::Collection { route, rss: true, .. } => {
                Some(url_join(&[route.as_str(), "rss/"]))
            }
            _ => None,
        }
    }

    /// Child feed router, if any.
    pub fn rss_router(&self) -> Option<Router> {
        match self {
            Self::Channel { route, rss: true, .. } | Self::Collection { route, rss: true, .. } => {
                Some(Self::Rss {
                    parent: self.id(),
                    route: route.clone(),
                })
            }
            _ => None,
        }
    }

    /// Generator parameters for routers that own urls.
    pub fn generator_spec(&self) -> Option<GeneratorSpec> {
        let permalink = self.permalinks()?.clone();
        let resource_type = self.resource_type()?;
        Some(GeneratorSpec {
            identifier: self.id(),
            filter: self.filter().cloned().unwrap_or_default(),
            resource_type,
            permalink,
        })
    }

    /// Routes in match order.
    pub fn routes(&self) -> Vec<Route> {
        let paged = |route: &UrlPath| url_join(&[route.as_str(), "page/:page/"]);

        match self {
            Self::Preview => vec![Route::pattern(RouteKind::Preview, "/p/:uuid/")],
            Self::Email => vec![Route::pattern(RouteKind::Email, "/email/:uuid/")],
            Self::Unsubscribe => vec![Route::pattern(RouteKind::Unsubscribe, "/unsubscribe/")],
            Self::StaticRoute { route, templates } => {
                let template = templates.first().cloned().unwrap_or_default();
                vec![Route::pattern(RouteKind::Template(template), route.as_str())]
            }
            Self::Channel { route, .. } => vec![
                Route::pattern(RouteKind::Listing, route.as_str()),
                Route::pattern(RouteKind::Listing, &paged(route)),
            ],
            Self::Taxonomy { .. } => vec![
                Route::owned(RouteKind::Listing, EntrySuffix::None),
                Route::owned(RouteKind::Listing, EntrySuffix::Page),
                Route::owned(RouteKind::Rss, EntrySuffix::Rss),
                Route::owned(RouteKind::Edit, EntrySuffix::Edit),
            ],
            Self::Collection { route, .. } => vec![
                Route::pattern(RouteKind::Listing, route.as_str()),
                Route::pattern(RouteKind::Listing, &paged(route)),
                Route::owned(RouteKind::Entry, EntrySuffix::None),
                Route::owned(RouteKind::Edit, EntrySuffix::Edit),
            ],
            Self::StaticPages { .. } => vec![
                Route::owned(RouteKind::Entry, EntrySuffix::None),
                Route::owned(RouteKind::Edit, EntrySuffix::Edit),
            ],
            Self::Rss { route, .. } => vec![
                Route::pattern(RouteKind::Rss, &url_join(&[route.as_str(), "rss/"])),
                Route::pattern(RouteKind::Rss, &url_join(&[route.as_str(), "rss/:page/"])),
            ],
            Self::Apps { routes } => routes
                .iter()
                .map(|r| Route::pattern(RouteKind::App(r.app.clone()), &r.path))
                .collect(),
        }
    }
}
