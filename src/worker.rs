//! Event dispatcher: routes platform events to their handlers.

use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;

use crate::background::Background;
use crate::cache::{CacheStorage, RequestKey, TierStore};
use crate::classify::Classifier;
use crate::config::{Config, NotificationConfig};
use crate::control::{on_notification_click, ClickOutcome, ControlMessage, ControlReply, Notification};
use crate::error::WorkerError;
use crate::host::ClientHost;
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::network::Fetcher;
use crate::request::Request;
use crate::strategy::{CacheFirst, NetworkFirst, Served};
use crate::sync::{ActionStore, SyncQueue, SyncReport};

/// Events delivered to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  /// A request intercepted from the page
  Fetch(Request),
  /// A control message, with an optional reply port
  Message {
    message: ControlMessage,
    reply: Option<oneshot::Sender<ControlReply>>,
  },
  /// A push message with its text payload
  Push { payload: Option<String> },
  /// A click on a notification, `None` for the body
  NotificationClick { action: Option<String> },
  /// Connectivity restored
  Sync { tag: String },
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
  /// Install finished; `activate_now` if skip-waiting was requested
  Installed { activate_now: bool },
  /// Activation finished, with the tiers it deleted
  Activated { evicted: Vec<String> },
  /// Response to an intercepted request
  Response(Served),
  /// One sync pass finished
  Synced(SyncReport),
  /// Event handled, nothing to return
  Handled,
  /// Event not meant for this worker
  Ignored,
}

/// The offline resource manager.
pub struct ServiceWorker<S: CacheStorage, A: ActionStore, F: Fetcher> {
  classifier: Classifier,
  tiers: TierStore<S>,
  cache_first: CacheFirst<S, F>,
  network_first: NetworkFirst<S, F>,
  lifecycle: Lifecycle<S, F>,
  queue: SyncQueue<A, F>,
  host: Arc<dyn ClientHost>,
  background: Background,
  shell_url: Url,
  notification: NotificationConfig,
  sync_tag: String,
  queue_failed_mutations: bool,
}

impl<S, A, F> ServiceWorker<S, A, F>
where
  S: CacheStorage + 'static,
  A: ActionStore,
  F: Fetcher,
{
  pub fn new(
    config: &Config,
    storage: Arc<S>,
    actions: A,
    fetcher: Arc<F>,
    host: Arc<dyn ClientHost>,
  ) -> Self {
    let tiers = TierStore::new(storage, &config.version);
    let background = Background::new();
    let shell_url = config.shell_url();
    let shell_key = RequestKey::get(&shell_url);

    Self {
      classifier: Classifier::from_config(config),
      cache_first: CacheFirst::new(
        tiers.clone(),
        Arc::clone(&fetcher),
        background.clone(),
        shell_key.clone(),
      ),
      network_first: NetworkFirst::new(tiers.clone(), Arc::clone(&fetcher), shell_key),
      lifecycle: Lifecycle::new(tiers.clone(), Arc::clone(&fetcher), config.manifest_urls()),
      queue: SyncQueue::new(actions, fetcher),
      tiers,
      host,
      background,
      shell_url,
      notification: config.notification.clone(),
      sync_tag: config.sync.tag.clone(),
      queue_failed_mutations: config.sync.queue_failed_mutations,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  pub fn tiers(&self) -> &TierStore<S> {
    &self.tiers
  }

  pub fn queue(&self) -> &SyncQueue<A, F> {
    &self.queue
  }

  /// Current static tier name, reported as the worker version.
  pub fn version(&self) -> &str {
    &self.tiers.names().static_name
  }

  /// Wait until all background work (revalidation) has finished.
  pub async fn settle(&self) {
    self.background.settle().await;
  }

  /// Handle one event.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    match event {
      WorkerEvent::Install => {
        self.lifecycle.install().await?;
        Ok(EventOutcome::Installed {
          activate_now: self.lifecycle.ready_to_activate(),
        })
      }
      WorkerEvent::Activate => {
        let evicted = self.lifecycle.activate(self.host.as_ref())?;
        Ok(EventOutcome::Activated { evicted })
      }
      WorkerEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Response),
      WorkerEvent::Message { message, reply } => self.message(message, reply),
      WorkerEvent::Push { payload } => {
        let notification = Notification::for_push(&self.notification, payload.as_deref());
        self.host.show_notification(&notification);
        Ok(EventOutcome::Handled)
      }
      WorkerEvent::NotificationClick { action } => {
        match on_notification_click(action.as_deref(), &self.shell_url) {
          ClickOutcome::OpenRoot(url) => self.host.open_or_focus(&url),
          ClickOutcome::Dismiss => tracing::debug!(?action, "Notification dismissed"),
        }
        Ok(EventOutcome::Handled)
      }
      WorkerEvent::Sync { tag } => {
        if tag != self.sync_tag {
          tracing::debug!(%tag, "Ignoring sync for unknown tag");
          return Ok(EventOutcome::Ignored);
        }
        let report = self.queue.drain().await?;
        tracing::info!(
          replayed = report.replayed.len(),
          failed = report.failed.len(),
          "Sync pass finished"
        );
        Ok(EventOutcome::Synced(report))
      }
    }
  }

  /// Answer an intercepted request with the strategy its class calls for.
  pub async fn fetch(&self, request: Request) -> Result<Served, WorkerError> {
    let class = self.classifier.classify(&request);
    tracing::debug!(method = %request.method, url = %request.url, ?class, "Intercepted");

    let result = if class.is_cache_first() {
      self.cache_first.handle(&request, class.tier()).await
    } else {
      self.network_first.handle(&request, class).await
    };

    result.map_err(|e| {
      if self.should_queue(&request) {
        if let Err(store_err) = self.queue.enqueue(&request) {
          tracing::warn!(error = %store_err, "Failed to queue offline mutation");
        }
      }
      WorkerError::from(e)
    })
  }

  fn should_queue(&self, request: &Request) -> bool {
    self.queue_failed_mutations
      && !request.is_get()
      && self.classifier.is_api_path(request.url.path())
  }

  fn message(
    &self,
    message: ControlMessage,
    reply: Option<oneshot::Sender<ControlReply>>,
  ) -> Result<EventOutcome, WorkerError> {
    let response = match message {
      ControlMessage::SkipWaiting => {
        self.lifecycle.skip_waiting();
        if self.lifecycle.state() == WorkerState::Waiting {
          let evicted = self.lifecycle.activate(self.host.as_ref())?;
          return Ok(EventOutcome::Activated { evicted });
        }
        None
      }
      ControlMessage::GetVersion => Some(ControlReply::Version {
        version: self.version().to_string(),
      }),
      ControlMessage::QueueAction {
        method,
        url,
        headers,
        body,
      } => {
        let mut request = Request::new(&method, url);
        request.headers = headers;
        request.body = body.map(String::into_bytes);
        Some(match self.queue.enqueue(&request) {
          Ok(action) => ControlReply::Queued { id: action.id },
          Err(e) => ControlReply::Error {
            error: e.to_string(),
          },
        })
      }
      ControlMessage::CancelAction { id } => Some(match self.queue.cancel(id) {
        Ok(cancelled) => ControlReply::Cancelled { cancelled },
        Err(e) => ControlReply::Error {
          error: e.to_string(),
        },
      }),
    };

    if let (Some(response), Some(port)) = (response, reply) {
      if port.send(response).is_err() {
        tracing::debug!("Reply port closed before the reply was sent");
      }
    }
    Ok(EventOutcome::Handled)
  }
}
