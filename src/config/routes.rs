//! Route settings (`routes.toml`).
//!
//! ```toml
//! [routes]
//! "/about/" = "about"
//! "/podcast/" = { controller = "channel", filter = "tag:podcast", limit = 10, order = "title asc" }
//!
//! [collections."/"]
//! permalink = "/:slug/"
//! templates = ["index", "home"]
//! order = "published_at desc"
//!
//! [taxonomies]
//! tag = "/tag/:slug/"
//! author = "/author/:slug/"
//! ```
//!
//! Table order is kept: it is the registration order of the routers, and
//! therefore their precedence.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::UrlPath;
use crate::filter::Filter;
use crate::permalink::PermalinkPattern;
use crate::resource::ResourceType;

// ============================================================================
// Raw (as written)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRouteSettings {
    #[serde(default)]
    routes: IndexMap<String, RawRoute>,
    #[serde(default)]
    collections: IndexMap<String, RawCollection>,
    #[serde(default)]
    taxonomies: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRoute {
    Template(String),
    Detailed(RawRouteDetail),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRouteDetail {
    controller: Option<String>,
    #[serde(default, alias = "template")]
    templates: RawTemplates,
    filter: Option<String>,
    limit: Option<u32>,
    order: Option<String>,
    rss: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCollection {
    permalink: String,
    #[serde(default, alias = "template")]
    templates: RawTemplates,
    filter: Option<String>,
    limit: Option<u32>,
    order: Option<String>,
    #[serde(default = "default_rss")]
    rss: bool,
}

/// `template = "a"` or `templates = ["a", "b"]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTemplates {
    One(String),
    Many(Vec<String>),
}

impl Default for RawTemplates {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<RawTemplates> for Vec<String> {
    fn from(raw: RawTemplates) -> Self {
        match raw {
            RawTemplates::One(template) => vec![template],
            RawTemplates::Many(templates) => templates,
        }
    }
}

fn default_rss() -> bool {
    true
}

// ============================================================================
// Validated
// ============================================================================

/// Taxonomy kinds that can be routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKey {
    Tag,
    Author,
}

impl TaxonomyKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Author => "author",
        }
    }

    pub const fn resource_type(&self) -> ResourceType {
        match self {
            Self::Tag => ResourceType::Tags,
            Self::Author => ResourceType::Authors,
        }
    }
}

impl fmt::Display for TaxonomyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a channel or collection lists its posts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingOptions {
    /// Templates to try, first match wins
    pub templates: Vec<String>,
    /// Posts per page; the theme decides when unset
    pub limit: Option<u32>,
    /// Sort terms, e.g. `published_at desc, title asc`
    pub order: Option<String>,
}

/// Channel: a filtered listing without its own entry urls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSetting {
    pub filter: Filter,
    #[serde(flatten)]
    pub listing: ListingOptions,
    pub rss: bool,
}

/// Operator-declared route
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "controller", rename_all = "lowercase")]
pub enum RouteSetting {
    /// Plain page rendered with the first available template
    Template { templates: Vec<String> },
    Channel(ChannelSetting),
}

/// Collection: owns entry urls through its permalink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSetting {
    pub permalink: PermalinkPattern,
    pub filter: Filter,
    #[serde(flatten)]
    pub listing: ListingOptions,
    pub rss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSettings {
    pub routes: IndexMap<UrlPath, RouteSetting>,
    pub collections: IndexMap<UrlPath, CollectionSetting>,
    pub taxonomies: IndexMap<TaxonomyKey, PermalinkPattern>,
}

impl Default for RouteSettings {
    /// Index collection at `/` plus tag and author archives.
    fn default() -> Self {
        let pattern = |p: &str| PermalinkPattern::parse(p).ok();

        let mut collections = IndexMap::new();
        if let Some(permalink) = pattern("/:slug/") {
            collections.insert(
                UrlPath::from_page("/"),
                CollectionSetting {
                    permalink,
                    filter: Filter::all(),
                    listing: ListingOptions {
                        templates: vec!["index".to_string()],
                        ..ListingOptions::default()
                    },
                    rss: true,
                },
            );
        }

        let mut taxonomies = IndexMap::new();
        for (key, p) in [(TaxonomyKey::Tag, "/tag/:slug/"), (TaxonomyKey::Author, "/author/:slug/")] {
            if let Some(permalink) = pattern(p) {
                taxonomies.insert(key, permalink);
            }
        }

        Self {
            routes: IndexMap::new(),
            collections,
            taxonomies,
        }
    }
}

impl RouteSettings {
    /// Load and validate a routes file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::parse(&content)
    }

    /// Parse and validate routes TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawRouteSettings = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRouteSettings) -> Result<Self, ConfigError> {
        let mut routes = IndexMap::new();
        for (path, route) in raw.routes {
            let field = format!("routes.{path}");
            let url = route_path(&field, &path)?;
            let setting = match route {
                RawRoute::Template(template) => RouteSetting::Template {
                    templates: vec![template],
                },
                RawRoute::Detailed(detail) => match detail.controller.as_deref() {
                    Some("channel") => RouteSetting::Channel(ChannelSetting {
                        filter: filter(&field, detail.filter.as_deref())?,
                        listing: listing(&field, detail.templates, detail.limit, detail.order)?,
                        rss: detail.rss.unwrap_or(true),
                    }),
                    Some(other) => {
                        return Err(ConfigError::Validation(format!(
                            "`{field}`: unknown controller `{other}`"
                        )));
                    }
                    None => {
                        if detail.limit.is_some() || detail.order.is_some() {
                            return Err(ConfigError::Validation(format!(
                                "`{field}`: `limit` and `order` need `controller = \"channel\"`"
                            )));
                        }
                        let mut templates: Vec<String> = detail.templates.into();
                        if templates.is_empty() {
                            templates.push(default_template(&url));
                        }
                        RouteSetting::Template { templates }
                    }
                },
            };
            routes.insert(url, setting);
        }

        let mut collections = IndexMap::new();
        for (path, collection) in raw.collections {
            let field = format!("collections.{path}");
            let url = route_path(&field, &path)?;
            collections.insert(
                url,
                CollectionSetting {
                    permalink: permalink(&field, &collection.permalink)?,
                    filter: filter(&field, collection.filter.as_deref())?,
                    listing: listing(
                        &field,
                        collection.templates,
                        collection.limit,
                        collection.order,
                    )?,
                    rss: collection.rss,
                },
            );
        }

        let mut taxonomies = IndexMap::new();
        for (key, pattern) in raw.taxonomies {
            let field = format!("taxonomies.{key}");
            let key = match key.as_str() {
                "tag" => TaxonomyKey::Tag,
                "author" => TaxonomyKey::Author,
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "`{field}`: only `tag` and `author` taxonomies are supported"
                    )));
                }
            };
            taxonomies.insert(key, permalink(&field, &pattern)?);
        }

        Ok(Self {
            routes,
            collections,
            taxonomies,
        })
    }
}

/// Route keys must be written with leading and trailing slashes.
fn route_path(field: &str, path: &str) -> Result<UrlPath, ConfigError> {
    if !path.starts_with('/') || !path.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "`{field}`: route must start and end with `/`"
        )));
    }
    Ok(UrlPath::from_page(path))
}

fn filter(field: &str, source: Option<&str>) -> Result<Filter, ConfigError> {
    Filter::parse(source.unwrap_or_default()).map_err(|source| ConfigError::Filter {
        field: format!("{field}.filter"),
        source,
    })
}

fn permalink(field: &str, pattern: &str) -> Result<PermalinkPattern, ConfigError> {
    PermalinkPattern::parse(pattern).map_err(|source| ConfigError::Permalink {
        field: field.to_string(),
        source,
    })
}

fn listing(
    field: &str,
    templates: RawTemplates,
    limit: Option<u32>,
    order: Option<String>,
) -> Result<ListingOptions, ConfigError> {
    if limit == Some(0) {
        return Err(ConfigError::Validation(format!(
            "`{field}.limit`: must be at least 1"
        )));
    }
    if let Some(order) = &order {
        validate_order(field, order)?;
    }
    Ok(ListingOptions {
        templates: templates.into(),
        limit,
        order,
    })
}

/// `field [asc|desc]`, comma separated.
fn validate_order(field: &str, order: &str) -> Result<(), ConfigError> {
    let invalid = |term: &str| {
        ConfigError::Validation(format!("`{field}.order`: invalid sort term `{term}`"))
    };

    for term in order.split(',').map(str::trim) {
        let mut words = term.split_whitespace();
        let valid_field = words
            .next()
            .is_some_and(|f| f.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        let valid_direction = words
            .next()
            .is_none_or(|d| d.eq_ignore_ascii_case("asc") || d.eq_ignore_ascii_case("desc"));
        if !valid_field || !valid_direction || words.next().is_some() {
            return Err(invalid(term));
        }
    }
    Ok(())
}

/// `/about/` → `about`, `/` → `index`
fn default_template(url: &UrlPath) -> String {
    let joined = url.segments().collect::<Vec<_>>().join("-");
    if joined.is_empty() {
        "index".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RouteSettings::default();
        assert!(settings.routes.is_empty());
        assert_eq!(settings.collections.len(), 1);
        assert_eq!(
            settings.taxonomies.keys().copied().collect::<Vec<_>>(),
            vec![TaxonomyKey::Tag, TaxonomyKey::Author]
        );
    }

    #[test]
    fn test_parse_keeps_order() {
        let settings = RouteSettings::parse(
            r#"
[routes]
"/about/" = "about"
"/podcast/" = { controller = "channel", filter = "tag:podcast" }
"/team/" = { template = "team" }

[collections."/blog/"]
permalink = "/blog/:year/:slug/"
filter = "tag:-podcast"

[collections."/"]
permalink = "/:slug/"
rss = false

[taxonomies]
author = "/writers/{slug}/"
"#,
        )
        .unwrap();

        let routes: Vec<&str> = settings.routes.keys().map(UrlPath::as_str).collect();
        assert_eq!(routes, vec!["/about/", "/podcast/", "/team/"]);
        assert!(matches!(
            settings.routes[1],
            RouteSetting::Channel(ChannelSetting { rss: true, .. })
        ));
        assert_eq!(
            settings.routes[2],
            RouteSetting::Template {
                templates: vec!["team".to_string()]
            }
        );

        let collections: Vec<&str> = settings.collections.keys().map(UrlPath::as_str).collect();
        assert_eq!(collections, vec!["/blog/", "/"]);
        assert!(settings.collections[0].permalink.has_date_token());
        assert!(!settings.collections[1].rss);

        assert_eq!(settings.taxonomies.len(), 1);
        assert_eq!(settings.taxonomies[&TaxonomyKey::Author].as_str(), "/writers/{slug}/");
    }

    #[test]
    fn test_rejects_bad_route_key() {
        let err = RouteSettings::parse(r#"routes = { "about" = "about" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_unknown_taxonomy() {
        let err = RouteSettings::parse(r#"taxonomies = { category = "/c/:slug/" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_reports_bad_filter_and_permalink() {
        let err = RouteSettings::parse(
            r#"
[collections."/"]
permalink = "/:slug/"
filter = "tag"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Filter { ref field, .. } if field == "collections./.filter"));

        let err = RouteSettings::parse(
            r#"
[collections."/"]
permalink = "/:nope/"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Permalink { .. }));
    }

    #[test]
    fn test_unknown_controller() {
        let err = RouteSettings::parse(
            r#"routes = { "/x/" = { controller = "redirect" } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown controller"));
    }

    #[test]
    fn test_listing_options() {
        let settings = RouteSettings::parse(
            r#"
[routes]
"/about/" = { templates = ["about", "page"] }
"/podcast/" = { controller = "channel", filter = "tag:podcast", limit = 10, order = "title asc" }

[collections."/"]
permalink = "/:slug/"
limit = 5
order = "published_at desc, title"
template = "home"
"#,
        )
        .unwrap();

        assert_eq!(
            settings.routes[0],
            RouteSetting::Template {
                templates: vec!["about".to_string(), "page".to_string()]
            }
        );
        let RouteSetting::Channel(channel) = &settings.routes[1] else {
            panic!("expected a channel");
        };
        assert_eq!(channel.listing.limit, Some(10));
        assert_eq!(channel.listing.order.as_deref(), Some("title asc"));
        assert!(channel.listing.templates.is_empty());

        let collection = &settings.collections[0];
        assert_eq!(
            collection.listing,
            ListingOptions {
                templates: vec!["home".to_string()],
                limit: Some(5),
                order: Some("published_at desc, title".to_string()),
            }
        );
    }

    #[test]
    fn test_rejects_bad_listing_options() {
        let err = RouteSettings::parse(
            r#"
[collections."/"]
permalink = "/:slug/"
order = "published_at sideways"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid sort term"));

        let err = RouteSettings::parse(
            r#"
[collections."/"]
permalink = "/:slug/"
limit = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = RouteSettings::parse(r#"routes = { "/about/" = { limit = 3 } }"#).unwrap_err();
        assert!(err.to_string().contains("controller"));
    }
}
