//! Service startup shared by every command.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::UrlmapConfig;
use crate::logger::plural_s;
use crate::resource::MemorySource;
use crate::routing::{RouterConfig, RouterManager};
use crate::service::{InitOptions, UrlService};
use crate::{debug, log};

/// A booted site: routers built, urls generated.
pub struct Site {
    pub config: UrlmapConfig,
    pub manager: RouterManager,
    pub service: Arc<UrlService>,
    pub source: MemorySource,
}

impl Site {
    /// Load content, build routers and run url generation.
    pub async fn boot(config: UrlmapConfig, use_cache: bool) -> Result<Self> {
        let settings = config
            .route_settings()
            .context("failed to load route settings")?;
        let service = Arc::new(UrlService::new(config.service_options()?));

        let manager = RouterManager::new();
        manager.init(
            RouterConfig::new(Arc::clone(&service))
                .with_settings(settings)
                .with_email(config.routing.email),
        );

        let content = config.content_path();
        let source = if content.exists() {
            MemorySource::from_json_file(&content)?
        } else {
            log!("warning"; "content file {} not found, starting empty", content.display());
            MemorySource::new()
        };
        debug!("init"; "{} resources in {}", source.len(), content.display());

        service
            .init(
                &source,
                InitOptions {
                    url_cache: use_cache && config.cache.enabled,
                },
            )
            .await?;

        let conflicts = service.urls().conflicts().len();
        if conflicts > 0 {
            log!("warning"; "{} url conflict{}, see `urlmap check`", conflicts, plural_s(conflicts));
        }

        Ok(Self {
            config,
            manager,
            service,
            source,
        })
    }

    /// Persist snapshots if a cache is configured.
    pub async fn shutdown(&self) -> Result<()> {
        self.service
            .shutdown()
            .await
            .context("failed to write url cache")
    }
}
