//! Assigns every intercepted request to exactly one caching strategy.

use std::collections::HashSet;

use crate::cache::TierKind;
use crate::config::{Config, RoutesConfig};
use crate::request::{Destination, Request};

/// Strategy class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
  StaticAsset,
  MapTile,
  ApiCall,
  Other,
}

impl RequestClass {
  /// Whether the cache is consulted before the network.
  pub fn is_cache_first(self) -> bool {
    matches!(self, RequestClass::StaticAsset | RequestClass::MapTile)
  }

  /// Tier the class reads from and writes to.
  pub fn tier(self) -> TierKind {
    match self {
      RequestClass::StaticAsset => TierKind::Static,
      RequestClass::MapTile | RequestClass::ApiCall | RequestClass::Other => TierKind::Dynamic,
    }
  }
}

/// Pure request classifier built from the route configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
  shell_paths: HashSet<String>,
  static_extensions: HashSet<String>,
  tile_hosts: Vec<String>,
  tile_path_prefixes: Vec<String>,
  api_prefix: String,
}

impl Classifier {
  pub fn new(routes: &RoutesConfig, shell_paths: impl IntoIterator<Item = String>) -> Self {
    Self {
      shell_paths: shell_paths.into_iter().collect(),
      static_extensions: routes
        .static_extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect(),
      tile_hosts: routes
        .tile_hosts
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect(),
      tile_path_prefixes: routes.tile_path_prefixes.clone(),
      api_prefix: routes.api_prefix.clone(),
    }
  }

  /// Classifier whose shell paths are the same-origin paths of the install manifest.
  pub fn from_config(config: &Config) -> Self {
    let origin = config.origin.origin();
    let shell_paths = config
      .manifest_urls()
      .into_iter()
      .filter(|url| url.origin() == origin)
      .map(|url| url.path().to_string());
    Self::new(&config.routes, shell_paths)
  }

  /// Classify a request. First matching rule wins.
  pub fn classify(&self, request: &Request) -> RequestClass {
    if !request.is_get() {
      return RequestClass::Other;
    }

    let path = request.url.path();

    if self.shell_paths.contains(path)
      || self.has_static_extension(path)
      || matches!(request.destination, Destination::Script | Destination::Style)
    {
      return RequestClass::StaticAsset;
    }

    if self.is_tile_host(request.url.host_str())
      || self.tile_path_prefixes.iter().any(|p| path.starts_with(p))
    {
      return RequestClass::MapTile;
    }

    if self.is_api_path(path) {
      return RequestClass::ApiCall;
    }

    RequestClass::Other
  }

  /// Whether `path` lives under the API mount point.
  pub fn is_api_path(&self, path: &str) -> bool {
    path.starts_with(&self.api_prefix) || path == self.api_prefix.trim_end_matches('/')
  }

  fn has_static_extension(&self, path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        self.static_extensions.contains(&ext.to_ascii_lowercase())
      }
      _ => false,
    }
  }

  fn is_tile_host(&self, host: Option<&str>) -> bool {
    let Some(host) = host else {
      return false;
    };
    let host = host.to_ascii_lowercase();
    self.tile_hosts.iter().any(|tile_host| {
      host == *tile_host
        || host
          .strip_suffix(tile_host.as_str())
          .is_some_and(|sub| sub.ends_with('.'))
    })
  }
}
