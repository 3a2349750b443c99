use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "UPLOADER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub database_path: String,
    pub media_root: String,
    pub max_upload_size: usize,
    pub allowed_origins: Vec<String>,
    pub serve_media: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            database_path: "./uploader.sqlite3".to_string(),
            media_root: "./media".to_string(),
            max_upload_size: 500 * 1024 * 1024,
            allowed_origins: Vec::new(),
            serve_media: true,
        }
    }
}

impl Config {
    /// Reads the TOML file at `path`, writing the defaults there first if it
    /// does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
        } else {
            let default_config = Config::default();
            let toml_string =
                toml::to_string_pretty(&default_config).context("failed to serialize default config")?;
            std::fs::write(path, toml_string)
                .with_context(|| format!("failed to create {}", path.display()))?;
            log::info!("wrote default config to {}", path.display());
            Ok(default_config)
        }
    }

    /// Loads the file named by `UPLOADER_CONFIG` (or `config.toml`) and makes
    /// sure the media root exists.
    pub fn from_env_config() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
        let cfg = Self::load(Path::new(&path))?;
        std::fs::create_dir_all(&cfg.media_root)
            .with_context(|| format!("create media root {}", cfg.media_root))?;
        Ok(cfg)
    }
}
