// config.rs — ApexConfig: project-level kernel configuration.
//
// Read from <project>/.apex/config.toml. Every field has a default, so a
// missing file and an empty file mean the same thing. A relative
// `database` path is resolved against the project root.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use apex_arbiter::DefendPolicy;
use apex_store::{Store, StoreConfig};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Directory under the project root holding the store and config.
pub const APEX_DIR: &str = ".apex";

/// Config file name inside [`APEX_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApexConfig {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// How long a store operation waits for the write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Budget window used when an operator allocates without naming one.
    #[serde(default = "default_window_hours")]
    pub default_window_hours: u32,

    /// Identity prefixes allowed to move the system into DEFEND.
    #[serde(default = "default_defend_authorities")]
    pub defend_authorities: Vec<String>,
}

impl Default for ApexConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            busy_timeout_ms: default_busy_timeout_ms(),
            default_window_hours: default_window_hours(),
            defend_authorities: default_defend_authorities(),
        }
    }
}

fn default_database() -> PathBuf {
    Path::new(APEX_DIR).join("apex.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_window_hours() -> u32 {
    apex_metabolism::DEFAULT_WINDOW_HOURS
}

fn default_defend_authorities() -> Vec<String> {
    DefendPolicy::default().authorities
}

impl ApexConfig {
    /// Defaults for a project, with the database under `<root>/.apex/`.
    pub fn for_project(root: &Path) -> Self {
        Self::default().rooted_at(root)
    }

    /// Load `<root>/.apex/config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self, KernelError> {
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(Self::for_project(root));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| KernelError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let config: ApexConfig =
            toml::from_str(&content).map_err(|source| KernelError::ConfigParse {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config.rooted_at(root))
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(APEX_DIR).join(CONFIG_FILE)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn defend_policy(&self) -> DefendPolicy {
        DefendPolicy::new(self.defend_authorities.iter().cloned())
    }

    /// Open the configured store, creating it on first use.
    pub fn open_store(&self) -> Result<Arc<Store>, KernelError> {
        Ok(Arc::new(Store::open(&self.database, &self.store_config())?))
    }

    fn rooted_at(mut self, root: &Path) -> Self {
        if self.database.is_relative() {
            self.database = root.join(&self.database);
        }
        self
    }
}
