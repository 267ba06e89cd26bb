use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::QueryConfig;
use crate::seasons::{self, Region};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub defaults: DefaultsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Sent as the User-Agent header (defaults to wowstat/<version>)
  pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
  10
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }

  pub fn user_agent(&self) -> String {
    self
      .user_agent
      .clone()
      .unwrap_or_else(|| concat!("wowstat/", env!("CARGO_PKG_VERSION")).to_string())
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
  #[serde(default)]
  pub region: Region,
  /// Season slug (defaults to the most recent known season)
  pub season: Option<String>,
}

impl DefaultsConfig {
  pub fn season(&self) -> &str {
    self
      .season
      .as_deref()
      .unwrap_or_else(|| seasons::current_season().slug)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// How long a fetched value counts as fresh
  pub stale_time_secs: u64,
  /// How long an unused entry stays in memory
  pub cache_time_secs: u64,
  /// Automatic retries for network errors, timeouts and 5xx responses
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub max_retry_delay_ms: u64,
  /// Keep snapshots in SQLite so a new process can serve the last known value
  pub persist: bool,
  /// Snapshot database path (defaults to the user's data directory)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: 60,
      cache_time_secs: 300,
      retry: 1,
      retry_delay_ms: 500,
      max_retry_delay_ms: 30_000,
      persist: true,
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn query_config(&self, request_timeout: Duration) -> QueryConfig {
    QueryConfig {
      stale_time: Duration::from_secs(self.stale_time_secs),
      cache_time: Duration::from_secs(self.cache_time_secs),
      request_timeout,
      retry: self.retry,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
      max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wowstat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wowstat/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/wowstat/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("wowstat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wowstat").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if let Some(season) = &config.defaults.season {
      if seasons::find_season(season).is_none() {
        return Err(eyre!("Unknown default season: {}", season));
      }
    }

    Ok(config)
  }

  /// Get the optional backend API token from the environment.
  ///
  /// Checks WOWSTAT_API_TOKEN; an empty value counts as unset.
  pub fn get_api_token() -> Option<String> {
    std::env::var("WOWSTAT_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  base_url: https://api.example.com\n").unwrap();

    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert!(config.api.user_agent().starts_with("wowstat/"));
    assert_eq!(config.defaults.region, Region::Us);
    assert_eq!(config.defaults.season(), seasons::current_season().slug);
    assert!(config.cache.persist);

    let query = config.cache.query_config(config.api.timeout());
    assert_eq!(query.stale_time, Duration::from_secs(60));
    assert_eq!(query.cache_time, Duration::from_secs(300));
    assert_eq!(query.retry, 1);
    assert_eq!(query.retry_delay, Duration::from_millis(500));
    assert_eq!(query.request_timeout, Duration::from_secs(10));
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
api:
  base_url: https://api.example.com
  timeout_secs: 3
  user_agent: custom/1.0
defaults:
  region: eu
  season: season-tww-2
cache:
  stale_time_secs: 5
  retry: 3
  persist: false
  path: /tmp/wowstat-test.db
"#,
    )
    .unwrap();

    assert_eq!(config.api.user_agent(), "custom/1.0");
    assert_eq!(config.defaults.region, Region::Eu);
    assert_eq!(config.defaults.season(), "season-tww-2");
    assert_eq!(config.cache.stale_time_secs, 5);
    assert_eq!(config.cache.cache_time_secs, 300);
    assert_eq!(config.cache.retry, 3);
    assert!(!config.cache.persist);
    assert_eq!(
      config.cache.path.as_deref(),
      Some(Path::new("/tmp/wowstat-test.db"))
    );
  }

  #[test]
  fn test_missing_api_section_rejected() {
    assert!(Config::parse("defaults:\n  region: us\n").is_err());
  }

  #[test]
  fn test_unknown_region_rejected() {
    assert!(Config::parse("api:\n  base_url: x\ndefaults:\n  region: mars\n").is_err());
  }

  #[test]
  fn test_unknown_season_rejected() {
    assert!(
      Config::parse("api:\n  base_url: x\ndefaults:\n  season: season-bc-1\n").is_err()
    );
  }

  #[test]
  fn test_explicit_missing_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/wowstat.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
