//! Business logic services

pub mod assets;
pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod ledger;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub inventory: inventory::InventoryManager,
    pub ledger: ledger::LedgerService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let assets: Arc<dyn assets::AssetStore> = Arc::new(assets::LocalAssetStore::new(
            &config.uploads.dir,
            config.uploads.default_cover.clone(),
        ));
        Self::with_assets(repository, config, assets)
    }

    /// Same as [`Services::new`] with a caller-provided cover store
    pub fn with_assets(
        repository: Repository,
        config: &AppConfig,
        assets: Arc<dyn assets::AssetStore>,
    ) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(
                repository.clone(),
                assets.clone(),
                config.uploads.default_cover.clone(),
            ),
            inventory: inventory::InventoryManager::new(
                repository.clone(),
                assets,
                config.inventory.max_retries,
            ),
            ledger: ledger::LedgerService::new(repository.clone()),
            repository,
        }
    }
}
