use std::path::{Path, PathBuf};

use taskbook_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILENAMES: [&str; 3] = ["config.yml", "config.yaml", "config.toml"];

pub const ENV_DATABASE_PATH: &str = "TASKBOOK_DATABASE_PATH";
pub const ENV_LOG: &str = "TASKBOOK_LOG";

/// Resolves and parses the taskbook configuration file.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at the platform config directory (`~/.config/taskbook` on Linux).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .map(|d| d.join("taskbook"))
            .unwrap_or_else(|| PathBuf::from(".taskbook"));
        Self { config_dir }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// First existing config file in the config directory, if any.
    pub fn default_config_path(&self) -> Option<PathBuf> {
        CONFIG_FILENAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load the default config file, falling back to defaults when none
    /// exists, then apply environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), with overrides read through `lookup`.
    pub fn load_with_env(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
        let mut config = match self.default_config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                debug!(
                    "no config file in {}, using defaults",
                    self.config_dir.display()
                );
                AppConfig::default()
            }
        };
        apply_env_overrides(&mut config, lookup);
        Ok(config)
    }

    /// Parse a specific config file. The format is chosen by extension.
    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let config = parse_config(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_config(path: &Path, contents: &str) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
        "toml" => {
            toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
        }
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// Apply `TASKBOOK_*` overrides. `lookup` abstracts the environment so
/// callers can supply their own source.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|v| !v.is_empty()) {
        debug!("{ENV_DATABASE_PATH} overrides database.path");
        config.database.path = PathBuf::from(path);
    }
    if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
        config.log.level = level;
    }
}
