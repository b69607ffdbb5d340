//! Configuration management for `urlmap.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error      # ConfigError
//! ├── routes     # RouteSettings (routes.toml)
//! ├── util       # config file discovery
//! └── mod.rs     # UrlmapConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section     | Purpose                                          |
//! |-------------|--------------------------------------------------|
//! | `[site]`    | Site url (origin + subdirectory) and timezone    |
//! | `[routing]` | Routes file, optional email routes               |
//! | `[content]` | JSON content file fed to the in-memory source    |
//! | `[cache]`   | Persistent url/resource snapshots                |
//! | `[queue]`   | `init` stage tolerance and subscriber threshold  |

mod error;
mod routes;
mod util;

pub use error::ConfigError;
pub use routes::{
    ChannelSetting, CollectionSetting, ListingOptions, RouteSetting, RouteSettings, TaxonomyKey,
};
pub use util::{find_config_file, find_config_from};

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::cache::LocalFileCache;
use crate::core::UrlUtils;
use crate::service::ServiceOptions;
use crate::{debug, log};

/// Default config file name
pub const CONFIG_FILE: &str = "urlmap.toml";

/// Routes file looked up next to the config when `[routing] routes` is unset
pub const ROUTES_FILE: &str = "routes.toml";

// ============================================================================
// sections
// ============================================================================

/// `[site]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Public site url, may include a subdirectory
    pub url: String,
    /// IANA timezone name used for dated permalinks
    pub timezone: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:2368/".to_string(),
            timezone: "Etc/UTC".to_string(),
        }
    }
}

/// `[routing]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Routes file, relative to the config file
    pub routes: Option<PathBuf>,
    /// Mount `/email/:uuid/`
    pub email: bool,
}

/// `[content]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    pub file: PathBuf,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("content.json"),
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Read snapshots but never write them
    pub write_disabled: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".urlmap/cache"),
            write_disabled: false,
        }
    }
}

/// `[queue]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// Longest wait for `init` subscribers, in milliseconds
    pub tolerance_ms: u64,
    pub required_subscribers: usize,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            tolerance_ms: 100,
            required_subscribers: 1,
        }
    }
}

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing urlmap.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlmapConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub site: SiteSection,

    #[serde(default)]
    pub routing: RoutingSection,

    #[serde(default)]
    pub content: ContentSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub queue: QueueSection,
}

impl UrlmapConfig {
    /// Load configuration, searching upward from cwd.
    ///
    /// Without a config file the defaults apply, rooted at cwd.
    pub fn load(config_name: &Path) -> Result<Self, ConfigError> {
        let config = match find_config_file(config_name) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = path;
                config
            }
            None => {
                debug!("config"; "{} not found, using defaults", config_name.display());
                let cwd = std::env::current_dir()
                    .map_err(|err| ConfigError::Io(PathBuf::from("."), err))?;
                Self {
                    config_path: cwd.join(config_name),
                    root: cwd,
                    ..Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        self.url_utils()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.site
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.site.timezone.clone()))
    }

    pub fn url_utils(&self) -> Result<UrlUtils, ConfigError> {
        UrlUtils::new(&self.site.url).map_err(|source| ConfigError::SiteUrl {
            url: self.site.url.clone(),
            source,
        })
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Routes from the configured file, `routes.toml` next to the config,
    /// or the defaults.
    pub fn route_settings(&self) -> Result<RouteSettings, ConfigError> {
        match &self.routing.routes {
            Some(path) => RouteSettings::load(&self.root_join(path)),
            None => {
                let implicit = self.root_join(ROUTES_FILE);
                if implicit.exists() {
                    RouteSettings::load(&implicit)
                } else {
                    Ok(RouteSettings::default())
                }
            }
        }
    }

    pub fn content_path(&self) -> PathBuf {
        self.root_join(&self.content.file)
    }

    /// Url service options derived from `[site]`, `[cache]` and `[queue]`.
    pub fn service_options(&self) -> Result<ServiceOptions, ConfigError> {
        let cache = self.cache.enabled.then(|| {
            LocalFileCache::new(self.root_join(&self.cache.dir), self.cache.write_disabled)
        });

        Ok(ServiceOptions {
            utils: self.url_utils()?,
            timezone: self.timezone()?,
            init_tolerance: Duration::from_millis(self.queue.tolerance_ms),
            required_subscribers: self.queue.required_subscribers,
            cache,
            ..ServiceOptions::default()
        })
    }
}
