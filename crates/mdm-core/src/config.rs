use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{FetchOptions, Format, Quality};
use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config location: {0}")]
    Location(#[from] xdg::BaseDirectoriesError),
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config encode: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Global configuration loaded from `~/.config/mdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Maximum download attempts per job, including the first. Range 1–10.
    pub max_attempts: u32,
    /// Maximum jobs downloading at once.
    pub max_concurrent_downloads: usize,
    /// Whether playlist URLs expand or only the single item is fetched.
    pub allow_playlists: bool,
    /// Output selection: audio-only, quality-constrained video, or best.
    pub format: Format,
    /// Resolution ceiling applied when `format = "video"`.
    pub quality: Quality,
    /// Backoff unit in seconds; attempt N waits N × this before retrying.
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
    /// Status poll interval for the server-backed fetcher.
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,
    /// Remote download server root. When set, fetching goes through the
    /// server instead of the local tool.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Destination directory; defaults to the working directory at run time.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_retry_base_delay_secs() -> u64 {
    2
}

fn default_status_poll_secs() -> u64 {
    5
}

impl Default for MdmConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_concurrent_downloads: 3,
            allow_playlists: false,
            format: Format::Best,
            quality: Quality::Best,
            retry_base_delay_secs: default_retry_base_delay_secs(),
            status_poll_secs: default_status_poll_secs(),
            server_url: None,
            download_dir: None,
        }
    }
}

impl MdmConfig {
    /// Reject out-of-range values before anything is built from the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "max_attempts must be in 1..=10, got {}",
                self.max_attempts
            )));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_downloads must be at least 1".into(),
            ));
        }
        if self.status_poll_secs == 0 {
            return Err(ConfigError::Invalid(
                "status_poll_secs must be at least 1".into(),
            ));
        }
        if let Some(server) = &self.server_url {
            url::Url::parse(server).map_err(|e| {
                ConfigError::Invalid(format!("server_url is not a valid URL: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.retry_base_delay_secs),
        )
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs)
    }

    /// Fetch options with the destination resolved; `fallback_dir` is used
    /// when no `download_dir` is configured.
    pub fn fetch_options(&self, fallback_dir: PathBuf) -> FetchOptions {
        FetchOptions {
            format: self.format,
            quality: self.quality,
            allow_playlists: self.allow_playlists,
            download_dir: self.download_dir.clone().unwrap_or(fallback_dir),
        }
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MdmConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
