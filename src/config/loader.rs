use super::GatewayConfig;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// `~/.agentgate/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".agentgate").join("config.toml"))
}

impl GatewayConfig {
    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        let mut config = Self::load_file(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::debug!(
                path = %config_path.display(),
                "no config file, using defaults"
            );
            return Ok(Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            });
        }

        let contents = fs::read_to_string(config_path).with_context(|| {
            format!("Failed to read config file '{}'", config_path.display())
        })?;
        let mut config: Self = toml::from_str(&contents).with_context(|| {
            format!("Failed to parse config file '{}'", config_path.display())
        })?;
        config.config_path = config_path.to_path_buf();
        Ok(config)
    }
}
