//! Network-first retrieval with a cached fallback.

use std::sync::Arc;

use super::{offline_response, offline_shell, ResponseSource, Served};
use crate::cache::{CacheStorage, RequestKey, TierKind, TierStore};
use crate::classify::RequestClass;
use crate::error::FetchError;
use crate::network::Fetcher;
use crate::request::Request;

/// Tries the network and falls back to the dynamic tier.
pub struct NetworkFirst<S: CacheStorage, F: Fetcher> {
  tiers: TierStore<S>,
  fetcher: Arc<F>,
  /// Key of the offline shell document in the static tier
  shell_key: RequestKey,
}

impl<S: CacheStorage, F: Fetcher> NetworkFirst<S, F> {
  pub fn new(tiers: TierStore<S>, fetcher: Arc<F>, shell_key: RequestKey) -> Self {
    Self {
      tiers,
      fetcher,
      shell_key,
    }
  }

  /// Answer `request`, classified as `class`.
  ///
  /// Successful GET responses are written to the dynamic tier. When the
  /// network fails or answers non-2xx, fallbacks are tried in order: the
  /// stored copy, the synthesized offline response for API calls, the cached
  /// shell for navigations. Without one, a non-2xx is passed through and a
  /// network error propagated.
  pub async fn handle(&self, request: &Request, class: RequestClass) -> Result<Served, FetchError> {
    let key = RequestKey::for_request(request);

    let (error, upstream) = match self.fetcher.fetch(request).await {
      Ok(response) if response.is_success() => {
        if let Some(key) = &key {
          if let Err(e) = self.tiers.put(TierKind::Dynamic, key, &response) {
            tracing::warn!(%key, error = %e, "Failed to store response");
          }
        }
        return Ok(Served::new(response, ResponseSource::Network));
      }
      Ok(response) => (
        FetchError::Status {
          status: response.status,
          url: request.url.to_string(),
        },
        Some(response),
      ),
      Err(e) => (e, None),
    };

    if let Some(key) = &key {
      match self.tiers.get(TierKind::Dynamic, key) {
        Ok(Some(stale)) => {
          tracing::debug!(%key, error = %error, "Network failed, serving stale copy");
          return Ok(Served::new(stale, ResponseSource::StaleCache));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%key, error = %e, "Cache read failed, treating as miss"),
      }
    }

    if class == RequestClass::ApiCall {
      tracing::debug!(url = %request.url, error = %error, "Serving offline response");
      return Ok(Served::new(offline_response(), ResponseSource::Offline));
    }

    if request.wants_document() {
      if let Some(shell) = offline_shell(&self.tiers, &self.shell_key) {
        tracing::debug!(url = %request.url, error = %error, "Serving offline shell");
        return Ok(Served::new(shell, ResponseSource::OfflineShell));
      }
    }

    match upstream {
      Some(response) => Ok(Served::new(response, ResponseSource::Network)),
      None => Err(error),
    }
  }
}
