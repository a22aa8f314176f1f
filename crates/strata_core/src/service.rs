//! CacheService - the single owner of every store and collection.
//!
//! The service holds the shared [`StoreEnv`] (config, event bus, context
//! registry) and the [`StoreRegistry`]. Collections are built lazily per chain
//! and handed out as `Arc`s; asking twice for the same chain returns the same
//! collection.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::collection::Collection;
use crate::collections::{ABIS, AbisCollection, NAMES, NamesCollection};
use crate::config::CacheConfig;
use crate::error::{CacheError, ConfigError, Result};
use crate::event::StoreEvent;
use crate::registry::{StoreRegistry, StoreSummary};
use crate::sdk::{AbisSdk, NamesSdk};
use crate::store::StoreEnv;

#[derive(Debug)]
pub struct CacheService {
    env: StoreEnv,
    stores: StoreRegistry,
    abis_sdk: Option<Arc<dyn AbisSdk>>,
    names_sdk: Option<Arc<dyn NamesSdk>>,
    abis: DashMap<String, Arc<AbisCollection>>,
    names: DashMap<String, Arc<NamesCollection>>,
}

impl CacheService {
    pub fn builder() -> CacheServiceBuilder {
        CacheServiceBuilder::new()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.env.config
    }

    pub fn env(&self) -> &StoreEnv {
        &self.env
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Progress and status notifications from every store
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.env.events.subscribe()
    }

    /// Collection names available with the configured SDKs
    pub fn collections(&self) -> Vec<String> {
        let mut available = Vec::new();
        if self.abis_sdk.is_some() {
            available.push(ABIS.to_string());
        }
        if self.names_sdk.is_some() {
            available.push(NAMES.to_string());
        }
        available
    }

    pub fn abis(&self, chain: &str) -> Result<Arc<AbisCollection>> {
        if let Some(existing) = self.abis.get(chain) {
            return Ok(Arc::clone(existing.value()));
        }
        let sdk = self
            .abis_sdk
            .as_ref()
            .ok_or_else(|| missing_sdk("abis_sdk"))?;
        let collection = Arc::new(AbisCollection::new(
            chain,
            Arc::clone(sdk),
            &self.stores,
            &self.env,
        )?);
        debug!("Built {} collection for {}", ABIS, chain);
        let entry = self.abis.entry(chain.to_string()).or_insert(collection);
        Ok(Arc::clone(entry.value()))
    }

    pub fn names(&self, chain: &str) -> Result<Arc<NamesCollection>> {
        if let Some(existing) = self.names.get(chain) {
            return Ok(Arc::clone(existing.value()));
        }
        let sdk = self
            .names_sdk
            .as_ref()
            .ok_or_else(|| missing_sdk("names_sdk"))?;
        let collection = Arc::new(NamesCollection::new(
            chain,
            Arc::clone(sdk),
            &self.stores,
            &self.env,
        )?);
        debug!("Built {} collection for {}", NAMES, chain);
        let entry = self.names.entry(chain.to_string()).or_insert(collection);
        Ok(Arc::clone(entry.value()))
    }

    /// Look a collection up by the name the API layer uses
    pub fn collection(&self, name: &str, chain: &str) -> Result<Arc<dyn Collection>> {
        match name {
            ABIS if self.abis_sdk.is_some() => Ok(self.abis(chain)? as Arc<dyn Collection>),
            NAMES if self.names_sdk.is_some() => Ok(self.names(chain)? as Arc<dyn Collection>),
            _ => Err(CacheError::unknown_collection(name, self.collections())),
        }
    }

    /// Reset every store of one collection across all chains
    pub fn reset_collection(&self, name: &str) -> usize {
        let reset = self.stores.reset_category(name);
        info!("Reset {} {} stores", reset, name);
        reset
    }

    pub fn summaries(&self) -> Vec<StoreSummary> {
        self.stores.summaries()
    }

    /// Cancel every in-flight fetch. Committed data stays readable.
    pub fn shutdown(&self) {
        let cancelled = self.stores.cancel_all();
        self.env.contexts.cancel_all();
        info!("Cache service shut down, cancelled {} fetches", cancelled);
    }
}

fn missing_sdk(field: &str) -> CacheError {
    CacheError::config(field, ConfigError::MissingField(field.to_string()))
}

/// Builder for [`CacheService`]. Every field is optional; a service without
/// an SDK simply does not offer the matching collection.
#[derive(Debug, Default)]
pub struct CacheServiceBuilder {
    config: Option<CacheConfig>,
    abis_sdk: Option<Arc<dyn AbisSdk>>,
    names_sdk: Option<Arc<dyn NamesSdk>>,
}

impl CacheServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache configuration (optional, defaults otherwise)
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the cache configuration from a TOML file
    pub fn config_file(mut self, path: &Path) -> Result<Self> {
        let config = CacheConfig::load(path).map_err(|e| CacheError::config("config_file", e))?;
        self.config = Some(config);
        Ok(self)
    }

    pub fn abis_sdk(mut self, sdk: Arc<dyn AbisSdk>) -> Self {
        self.abis_sdk = Some(sdk);
        self
    }

    pub fn names_sdk(mut self, sdk: Arc<dyn NamesSdk>) -> Self {
        self.names_sdk = Some(sdk);
        self
    }

    /// Validate the configuration and build the service
    pub fn build(self) -> Result<CacheService> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| CacheError::config("cache", e))?;
        Ok(CacheService {
            env: StoreEnv::new(config),
            stores: StoreRegistry::new(),
            abis_sdk: self.abis_sdk,
            names_sdk: self.names_sdk,
            abis: DashMap::new(),
            names: DashMap::new(),
        })
    }
}
