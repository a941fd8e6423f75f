use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::png::RECOGNIZED_KEYWORDS;

/// Top-level configuration.
///
/// Controls which `tEXt` keywords count as generation metadata and how
/// output files are named.
///
/// # Loading
///
/// ```rust,no_run
/// use genmeta::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.keywords.push("Comment".into());
/// config.output.suffix = "_restored".into();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tEXt` keywords that count as generation metadata in PNG sources.
    pub keywords: Vec<String>,
    /// Output file naming.
    pub output: OutputConfig,
}

/// Output behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Appended to the target's file stem to name the output, e.g. `edit-meta.png`.
    pub suffix: String,
    /// If `true`, an existing output file is replaced. If `false`, writing fails.
    pub overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: RECOGNIZED_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "-meta".to_string(),
            overwrite: false,
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        if config.keywords.is_empty() {
            log::warn!("Config lists no keywords; PNG sources will never yield metadata");
        }
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
