use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Hosted backend; without it the mock backend is used
  pub backend: Option<BackendConfig>,
  /// Force the mock backend even when a backend is configured
  #[serde(default)]
  pub use_mock: bool,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://abcd.supabase.co
  pub url: String,
  /// Table holding orders
  #[serde(default = "default_table")]
  pub table: String,
  /// Unique column that stores the idempotency key of replayed creations.
  /// When set, a retried create resolves to the row already inserted.
  pub client_key_column: Option<String>,
}

fn default_table() -> String {
  "orders".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to run without any local persistence
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/suitesync/cache.db)
  pub path: Option<PathBuf>,
  /// Age in hours after which cached orders are flagged stale
  #[serde(default = "default_stale_after_hours")]
  pub stale_after_hours: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      stale_after_hours: default_stale_after_hours(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_after_hours() -> u32 {
  24
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// Seconds between reachability probes in watch mode
  #[serde(default = "default_probe_interval")]
  pub probe_interval_secs: u64,
  /// Per-request timeout for backend calls
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval(),
      request_timeout_secs: default_request_timeout(),
    }
  }
}

fn default_probe_interval() -> u64 {
  15
}

fn default_request_timeout() -> u64 {
  10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for rolling log files (default: $XDG_DATA_HOME/suitesync/logs)
  pub directory: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./suitesync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/suitesync/config.yaml
  ///
  /// With no file anywhere the defaults apply (mock backend).
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("suitesync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("suitesync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Whether the mock backend should be used.
  pub fn uses_mock(&self) -> bool {
    self.use_mock || self.backend.is_none()
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks SUITESYNC_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SUITESYNC_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set SUITESYNC_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Directory for log files.
  pub fn log_dir(&self) -> Option<PathBuf> {
    self
      .log
      .directory
      .clone()
      .or_else(|| dirs::data_dir().map(|d| d.join("suitesync").join("logs")))
  }
}
