//! Config file discovery and loading

use super::AggregatorConfig;
use crate::error::{AggregateError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "csvagg.toml";

/// Per-user configuration directory, if the platform has one
pub fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "csvagg").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Finds and reads the TOML layer
///
/// An explicit path must exist. Otherwise the first of
/// `./csvagg.toml` and `<user config dir>/csvagg.toml` that exists is used,
/// and defaults apply when neither does.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        let mut search_dirs = vec![PathBuf::from(".")];
        search_dirs.extend(user_config_dir());
        Self {
            explicit,
            search_dirs,
        }
    }

    /// Replace the implicit search locations
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// The file that `load` would read
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|path| path.is_file())
    }

    pub async fn load(&self) -> Result<AggregatorConfig> {
        match self.locate() {
            Some(path) => load_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(AggregatorConfig::default())
            }
        }
    }
}

async fn load_file(path: &Path) -> Result<AggregatorConfig> {
    debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| AggregateError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content).map_err(|source| AggregateError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}
