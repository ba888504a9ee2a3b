use std::sync::Arc;
use tokio::sync::RwLock;

use crate::commands::catalog::Catalog;
use crate::commands::config::CopilotConfig;
use crate::strategy::{StrategyCache, StrategyService};

/// Managed Tauri state shared by every command: settings, the HTTP client,
/// the champion catalog and the strategy cache.
pub struct AppState {
    config: RwLock<CopilotConfig>,
    catalog: RwLock<Arc<Catalog>>,
    cache: RwLock<Arc<StrategyCache>>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: CopilotConfig) -> Self {
        let cache = StrategyCache::new(config.cache_dir(), &config.cache_version);
        Self {
            config: RwLock::new(config),
            catalog: RwLock::new(Arc::new(Catalog::default())),
            cache: RwLock::new(Arc::new(cache)),
            http: reqwest::Client::new(),
        }
    }

    pub async fn config(&self) -> CopilotConfig {
        self.config.read().await.clone()
    }

    /// Swap in new settings. The cache is reopened when its location or
    /// version tag changed.
    pub async fn replace_config(&self, config: CopilotConfig) {
        let mut current = self.config.write().await;
        if current.cache_dir() != config.cache_dir() || current.cache_version != config.cache_version {
            let cache = StrategyCache::new(config.cache_dir(), &config.cache_version);
            *self.cache.write().await = Arc::new(cache);
        }
        *current = config;
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    pub async fn set_catalog(&self, catalog: Catalog) {
        *self.catalog.write().await = Arc::new(catalog);
    }

    pub async fn cache(&self) -> Arc<StrategyCache> {
        self.cache.read().await.clone()
    }

    /// Build a strategy service from the current settings.
    pub async fn strategy_service(&self) -> StrategyService {
        let config = self.config().await;
        StrategyService::from_config(&config, self.cache().await, self.http.clone())
    }
}
