use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Origin used when the config doesn't name one.
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Cache generation; embedded in the tier names
  pub version: String,
  /// Origin the app shell is served from
  pub origin: Url,
  /// Shell URLs pre-fetched on install, relative ones resolved against `origin`
  pub manifest: Vec<String>,
  pub routes: RoutesConfig,
  pub sync: SyncConfig,
  pub notification: NotificationConfig,
  /// Database location (defaults to the user data directory)
  pub database: Option<PathBuf>,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

/// Inputs to request classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Path prefix of the API gateway
  pub api_prefix: String,
  /// Extensions (without the dot) served cache-first from the static tier
  pub static_extensions: Vec<String>,
  /// Tile server hostnames; subdomains match too
  pub tile_hosts: Vec<String>,
  /// Path prefixes of the self-hosted tile service
  pub tile_path_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Tag carried by the connectivity-restored signal
  pub tag: String,
  /// Queue API mutations that fail while offline
  pub queue_failed_mutations: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push carries no text
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub explore_title: String,
  pub close_title: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is a valid URL"),
      manifest: [
        "/",
        "/index.html",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      routes: RoutesConfig::default(),
      sync: SyncConfig::default(),
      notification: NotificationConfig::default(),
      database: None,
      log_file: None,
    }
  }
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api_prefix: "/api/".to_string(),
      static_extensions: ["js", "mjs", "css", "svg", "png", "jpg", "jpeg", "gif", "webp", "ico"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      tile_hosts: [
        "tile.openstreetmap.org",
        "basemaps.cartocdn.com",
        "server.arcgisonline.com",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      tile_path_prefixes: vec!["/tiles/".to_string()],
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "background-sync".to_string(),
      queue_failed_mutations: false,
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Map Update".to_string(),
      default_body: "New map data is available".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      explore_title: "Open map".to_string(),
      close_title: "Close".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mapworker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mapworker/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mapworker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mapworker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("`version` must not be empty"));
    }
    if !self.routes.api_prefix.starts_with('/') {
      return Err(eyre!(
        "`routes.api_prefix` must start with '/', got '{}'",
        self.routes.api_prefix
      ));
    }
    for entry in &self.manifest {
      self
        .origin
        .join(entry)
        .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))?;
    }
    Ok(())
  }

  /// Manifest entries as absolute URLs, in manifest order.
  ///
  /// Entries that don't resolve are skipped; `load` rejects them up front.
  pub fn manifest_urls(&self) -> Vec<Url> {
    self
      .manifest
      .iter()
      .filter_map(|entry| match self.origin.join(entry) {
        Ok(url) => Some(url),
        Err(e) => {
          tracing::warn!(%entry, error = %e, "Skipping invalid manifest entry");
          None
        }
      })
      .collect()
  }

  /// URL of the offline shell document.
  pub fn shell_url(&self) -> Url {
    let mut url = self.origin.clone();
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    url
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::db::Database::default_path()
        .ok_or_else(|| eyre!("Could not determine data directory")),
    }
  }
}
