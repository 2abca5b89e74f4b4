//! Install/activate state machine and tier versioning.

use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::{CacheStorage, RequestKey, TierKind, TierStore};
use crate::error::{FetchError, WorkerError};
use crate::host::ClientHost;
use crate::network::Fetcher;
use crate::request::Request;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Not yet installed
  Parsed,
  Installing,
  /// Installed, waiting for the previous version to let go
  Waiting,
  Activating,
  Active,
  /// Install failed; the previous version stays in charge
  Redundant,
}

/// Owns install and activation for one worker version.
pub struct Lifecycle<S: CacheStorage, F: Fetcher> {
  tiers: TierStore<S>,
  fetcher: Arc<F>,
  manifest: Vec<Url>,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl<S: CacheStorage, F: Fetcher> Lifecycle<S, F> {
  pub fn new(tiers: TierStore<S>, fetcher: Arc<F>, manifest: Vec<Url>) -> Self {
    Self {
      tiers,
      fetcher,
      manifest,
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  /// Whether the worker asked to activate without waiting.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Request activation as soon as installation completes.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  /// Whether the worker is installed and should be activated now.
  pub fn ready_to_activate(&self) -> bool {
    self.state() == WorkerState::Waiting && self.skip_waiting_requested()
  }

  /// Move from one of `from` to `to`, or fail without changing state.
  fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), WorkerError> {
    let mut state = self.state.lock().map_err(|_| WorkerError::InvalidTransition {
      from: WorkerState::Redundant,
      to,
    })?;
    if !from.contains(&state) {
      return Err(WorkerError::InvalidTransition { from: *state, to });
    }
    tracing::debug!(from = ?*state, ?to, "Worker state change");
    *state = to;
    Ok(())
  }

  fn set_state(&self, to: WorkerState) {
    if let Ok(mut state) = self.state.lock() {
      *state = to;
    }
  }

  /// Pre-warm the static tier with every manifest URL.
  ///
  /// All-or-nothing: if any entry fails to fetch or answers non-2xx, nothing
  /// is stored and the worker becomes redundant.
  pub async fn install(&self) -> Result<(), WorkerError> {
    self.transition(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)?;
    tracing::info!(
      tier = %self.tiers.names().static_name,
      entries = self.manifest.len(),
      "Installing"
    );

    match self.prefetch_manifest().await {
      Ok(()) => {
        self.set_state(WorkerState::Waiting);
        self.skip_waiting();
        tracing::info!("Installed");
        Ok(())
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        tracing::warn!(error = %e, "Install failed");
        Err(e)
      }
    }
  }

  async fn prefetch_manifest(&self) -> Result<(), WorkerError> {
    let fetches = self.manifest.iter().map(|url| {
      let request = Request::get(url.clone());
      let fetch = self.fetcher.fetch(&request);
      async move {
        let install_error = |source| WorkerError::Install {
          url: request.url.to_string(),
          source,
        };
        let response = fetch.await.map_err(install_error)?;
        if !response.is_success() {
          return Err(install_error(FetchError::Status {
            status: response.status,
            url: request.url.to_string(),
          }));
        }
        Ok((RequestKey::get(&request.url), response))
      }
    });

    let entries = try_join_all(fetches).await?;
    self.tiers.put_all(TierKind::Static, &entries)?;
    Ok(())
  }

  /// Drop superseded tiers and take control of open pages.
  ///
  /// Returns the names of the deleted tiers.
  pub fn activate(&self, host: &dyn ClientHost) -> Result<Vec<String>, WorkerError> {
    self.transition(&[WorkerState::Waiting], WorkerState::Activating)?;

    let result = self
      .tiers
      .evict_stale()
      .and_then(|evicted| self.tiers.open_current().map(|()| evicted));

    match result {
      Ok(evicted) => {
        for name in &evicted {
          tracing::info!(tier = %name, "Deleted stale tier");
        }
        host.claim();
        self.set_state(WorkerState::Active);
        tracing::info!(version = %self.tiers.names().static_name, "Activated");
        Ok(evicted)
      }
      Err(e) => {
        self.set_state(WorkerState::Waiting);
        Err(e.into())
      }
    }
  }
}
