//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalogue::CatalogueService;
use crate::client::{AuthCache, HttpTransport, PoolConfig, SessionPool};
use crate::config::Config;
use crate::search::SearchMapping;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Catalogue orchestration service.
    catalogue: CatalogueService,

    /// Session pool, kept visible for health reporting.
    pool: SessionPool,
}

impl AppState {
    /// Create new application state: transport, eagerly-filled session pool,
    /// login cache and the validated Search mapping.
    pub async fn new(config: &Config) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::new(
                config.icat_url.clone(),
                config.catalogue_timeout,
                config.icat_check_cert,
            )
            .context("failed to create catalogue transport")?,
        );

        let pool = SessionPool::new(
            transport.clone(),
            config.mechanism.clone(),
            config.username.clone(),
            config.password.clone(),
            PoolConfig {
                init_size: config.client_pool_init_size,
                max_size: config.client_pool_max_size,
                borrow_timeout: config.pool_borrow_timeout,
                refresh_threshold_mins: config.session_refresh_threshold_mins,
            },
        )
        .await
        .context("failed to initialise the session pool")?;

        pool.spawn_maintenance(config.pool_maintenance_interval);

        let mapping = Arc::new(
            SearchMapping::load(&config.search_api_mapping_path)
                .context("failed to load the Search API mapping")?,
        );
        info!(
            path = %config.search_api_mapping_path.display(),
            "Search API mapping loaded"
        );

        let auth_cache = AuthCache::new(config.client_cache_size);
        let catalogue = CatalogueService::new(transport, pool.clone(), auth_cache, mapping);

        Ok(Self {
            inner: Arc::new(AppStateInner { catalogue, pool }),
        })
    }

    /// Build state from already-constructed parts (used by tests).
    pub fn from_parts(catalogue: CatalogueService, pool: SessionPool) -> Self {
        Self {
            inner: Arc::new(AppStateInner { catalogue, pool }),
        }
    }

    /// Get the catalogue service.
    pub fn catalogue(&self) -> &CatalogueService {
        &self.inner.catalogue
    }

    /// Get the session pool.
    pub fn pool(&self) -> &SessionPool {
        &self.inner.pool
    }
}
