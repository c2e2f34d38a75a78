use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::AioosConfig;

/// Loads the AIoOS configuration and keeps a shared, reloadable copy.
pub struct ConfigLoader {
    config: Arc<RwLock<AioosConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > AIOOS_CONFIG env > ~/.aioos/aioos.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("AIOOS_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aioos")
            .join("aioos.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> aioos_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            AioosConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(aioos_core::AioosError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Build a loader around an in-memory config (no file involved).
    pub fn from_config(config: AioosConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: PathBuf::new(),
        }
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> AioosConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<AioosConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the config from disk. An invalid file leaves the current config untouched.
    pub fn reload(&self) -> aioos_core::Result<()> {
        if !self.config_path.exists() {
            return Err(aioos_core::AioosError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        new_config.validate().map_err(aioos_core::AioosError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read_file(path: &Path) -> aioos_core::Result<AioosConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<AioosConfig>(&raw).map_err(|e| {
            aioos_core::AioosError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides (AIOOS_DB_PATH, AIOOS_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: AioosConfig) -> AioosConfig {
        if let Ok(v) = std::env::var("AIOOS_DB_PATH") {
            config.storage.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AIOOS_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("AIOOS_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Ok(v) = std::env::var("AIOOS_SWEEP_INTERVAL") {
            match v.parse::<u64>() {
                Ok(secs) => config.sweep.interval_secs = secs,
                Err(_) => warn!(value = %v, "ignoring non-numeric AIOOS_SWEEP_INTERVAL"),
            }
        }
        if let Ok(v) = std::env::var("AIOOS_USER") {
            config.identity.default_user = v;
        }
        config
    }
}
