//! Cache-first retrieval with background revalidation.

use std::sync::Arc;

use super::{offline_shell, ResponseSource, Served};
use crate::background::Background;
use crate::cache::{CacheStorage, RequestKey, TierKind, TierStore};
use crate::error::FetchError;
use crate::network::Fetcher;
use crate::request::Request;

/// Serves from a tier when possible and refreshes hits in the background.
pub struct CacheFirst<S: CacheStorage, F: Fetcher> {
  tiers: TierStore<S>,
  fetcher: Arc<F>,
  background: Background,
  /// Key of the offline shell document in the static tier
  shell_key: RequestKey,
}

impl<S: CacheStorage + 'static, F: Fetcher> CacheFirst<S, F> {
  pub fn new(
    tiers: TierStore<S>,
    fetcher: Arc<F>,
    background: Background,
    shell_key: RequestKey,
  ) -> Self {
    Self {
      tiers,
      fetcher,
      background,
      shell_key,
    }
  }

  /// Answer `request` from `tier`, falling back to the network.
  ///
  /// 1. Hit: return the stored snapshot and revalidate it in the background
  /// 2. Miss: fetch, store 2xx responses, return
  /// 3. Network error or non-2xx on a navigation: serve the cached shell
  /// 4. Otherwise a non-2xx is passed through and a network error propagated
  pub async fn handle(&self, request: &Request, tier: TierKind) -> Result<Served, FetchError> {
    let key = RequestKey::for_request(request);

    if let Some(key) = &key {
      match self.tiers.get(tier, key) {
        Ok(Some(cached)) => {
          tracing::debug!(%key, ?tier, "Cache hit");
          self.revalidate(request, tier, key.clone());
          return Ok(Served::new(cached, ResponseSource::Cache));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%key, error = %e, "Cache read failed, treating as miss"),
      }
    }

    let (error, upstream) = match self.fetcher.fetch(request).await {
      Ok(response) if response.is_success() => {
        if let Some(key) = &key {
          if let Err(e) = self.tiers.put(tier, key, &response) {
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

    if request.wants_document() {
      if let Some(shell) = offline_shell(&self.tiers, &self.shell_key) {
        tracing::debug!(url = %request.url, error = %error, "Serving offline shell");
        return Ok(Served::new(shell, ResponseSource::OfflineShell));
      }
    }

    // Nothing to fall back to: the page still gets the upstream status
    match upstream {
      Some(response) => Ok(Served::new(response, ResponseSource::Network)),
      None => Err(error),
    }
  }

  /// Refresh a cached entry without holding up the response.
  fn revalidate(&self, request: &Request, tier: TierKind, key: RequestKey) {
    let refresh = self.fetcher.fetch(request);
    let tiers = self.tiers.clone();

    self.background.spawn(async move {
      match refresh.await {
        Ok(response) if response.is_success() => match tiers.put(tier, &key, &response) {
          Ok(changed) => tracing::debug!(%key, changed, "Revalidated"),
          Err(e) => tracing::debug!(%key, error = %e, "Revalidation store failed"),
        },
        Ok(response) => {
          tracing::debug!(%key, status = response.status, "Revalidation returned non-success")
        }
        Err(e) => tracing::debug!(%key, error = %e, "Revalidation failed"),
      }
    });
  }
}
