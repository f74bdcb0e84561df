use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use media_prune_clients::ClientSet;
use media_prune_config::{Config, CredentialStore, LoggingConfig, PathManager};
use media_prune_core::Engine;
use std::path::{Path, PathBuf};

/// Where configuration and state live for this invocation.
pub struct AppContext {
    paths: PathManager,
    config_path: PathBuf,
}

impl AppContext {
    pub fn new(config_override: Option<PathBuf>) -> Result<Self> {
        let paths = PathManager::default();
        Ok(Self::with_paths(paths, config_override))
    }

    fn with_paths(paths: PathManager, config_override: Option<PathBuf>) -> Self {
        let config_path = config_override.unwrap_or_else(|| paths.config_file());
        Self { paths, config_path }
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Logging section of the config, or defaults when it cannot be read yet.
    /// Load errors surface later, once logging is up.
    pub fn logging_settings(&self) -> LoggingConfig {
        Config::load_from_file(&self.config_path)
            .map(|config| config.logging)
            .unwrap_or_default()
    }

    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Err(eyre!(
                "Configuration file not found at {}. Create it or pass --config <path>.",
                self.config_path.display()
            ));
        }
        Config::load_validated(&self.config_path)
            .map_err(|e| eyre!("Invalid configuration in {}: {:#}", self.config_path.display(), e))
    }

    pub fn credentials(&self) -> Result<CredentialStore> {
        let credentials_file = self.paths.credentials_file();
        let mut store = CredentialStore::new(credentials_file.clone());
        store
            .load()
            .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
        Ok(store)
    }

    pub fn build_clients(&self, config: &Config) -> Result<ClientSet> {
        let credentials = self.credentials()?;
        ClientSet::from_config(config, &credentials).wrap_err("Failed to create integration clients")
    }

    /// Engine over the persisted catalog, exclusions and job history.
    pub fn open_engine(&self) -> Result<Engine> {
        let config = self.load_config()?;
        let clients = self.build_clients(&config)?;
        Engine::open(config, clients, &self.paths).wrap_err("Failed to open Sweeparr state")
    }
}
