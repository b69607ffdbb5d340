//! urlmap - canonical url resolution for content sites.
//!
//! Routers built from `routes.toml` each own a url generator; generators
//! claim content resources and write their permalinks into a shared url
//! table that answers lookups in both directions.
//!
//! ```text
//! RouteSettings ──► RouterManager ──► UrlService ──► UrlGenerator × N
//!                                        │                 │
//!                        ResourceSource ─┴─► ResourceStore ┴─► UrlTable
//! ```

pub mod logger;

pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod filter;
pub mod generator;
pub mod permalink;
pub mod queue;
pub mod resource;
pub mod routing;
pub mod service;
pub mod urls;

pub use config::UrlmapConfig;
pub use resource::{MemorySource, Resource, ResourceEvent, ResourceId, ResourceSource, ResourceType};
pub use routing::{RouterConfig, RouterManager, SettingsEvent};
pub use service::{ServiceOptions, UrlService, UrlServiceError};
