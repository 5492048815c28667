use crate::{error::RepositoryError, faceted::MIN_CACHE_CAPACITY};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Global static variable to hold the config provider.
pub static CONFIG_PROVIDER: OnceCell<Mutex<Arc<dyn ConfigProvider>>> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Requested capacity of the matching-documents cache. Values below the floor are raised.
    pub bitset_capacity: usize,
    pub facet_count_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            bitset_capacity: 1000,
            facet_count_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Docbase values that never open a view, in addition to the root node id.
    pub ignored_docbases: Vec<String>,
    /// Refuse to open a view on a node that already occurs in the view's own chain.
    pub cycle_detection: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            ignored_docbases: Vec::new(),
            cycle_detection: true,
        }
    }
}

impl ViewConfig {
    pub fn is_ignored(&self, docbase: &str) -> bool {
        self.ignored_docbases.iter().any(|ignored| ignored == docbase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedConfig {
    /// Number of recomputed nodes staged between flushes during validation.
    pub batch_threshold: usize,
    /// Path of the folder holding derivative definitions.
    pub derivatives_path: String,
}

impl Default for DerivedConfig {
    fn default() -> Self {
        DerivedConfig {
            batch_threshold: 100,
            derivatives_path: "/hippo:configuration/hippo:derivatives".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub cache: CacheConfig,
    pub view: ViewConfig,
    pub derived: DerivedConfig,
}

impl RepositoryConfig {
    /// Effective cache capacities after applying the floor.
    pub fn effective_cache_capacities(&self) -> (usize, usize) {
        (
            self.cache.bitset_capacity.max(MIN_CACHE_CAPACITY),
            self.cache.facet_count_capacity.max(MIN_CACHE_CAPACITY),
        )
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<RepositoryConfig, RepositoryError>;
    fn set_config(&self, config: &RepositoryConfig) -> Result<(), RepositoryError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<RepositoryConfig, RepositoryError> {
        tracing::debug!("Attempting to read configuration from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(RepositoryConfig::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn set_config(&self, config: &RepositoryConfig) -> Result<(), RepositoryError> {
        tracing::debug!("Attempting to write configuration to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

/// Install the process-wide provider. Returns an error if one is already installed.
pub fn install_provider(provider: Arc<dyn ConfigProvider>) -> Result<(), RepositoryError> {
    CONFIG_PROVIDER
        .set(Mutex::new(provider))
        .map_err(|_| RepositoryError::Configuration("Config provider already installed".to_string()))
}

/// Configuration from the installed provider, or defaults when none is installed.
pub fn current_config() -> Result<RepositoryConfig, RepositoryError> {
    match CONFIG_PROVIDER.get() {
        Some(provider) => provider.lock().get_config(),
        None => Ok(RepositoryConfig::default()),
    }
}

pub fn get_content<P: AsRef<Path>>(path: P) -> Result<String, RepositoryError> {
    tracing::debug!("Reading {:?}", path.as_ref());
    Ok(read_to_string(path)?)
}
