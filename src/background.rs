//! Fire-and-forget work that outlives the event that started it.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Set of spawned background tasks.
///
/// Tasks are never awaited by the code that spawns them. Their failures are
/// handled inside the task; `settle` lets the host keep the worker alive until
/// everything has finished.
#[derive(Clone, Default)]
pub struct Background {
  tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Background {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn `task` on the current runtime, reaping tasks that already finished.
  pub fn spawn<Fut>(&self, task: Fut)
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    match self.tasks.lock() {
      Ok(mut tasks) => {
        while let Some(result) = tasks.try_join_next() {
          if let Err(e) = result {
            tracing::warn!(error = %e, "Background task panicked");
          }
        }
        tasks.spawn(task);
      }
      Err(_) => tracing::warn!("Background task set poisoned, dropping task"),
    }
  }

  /// Number of tasks spawned and not yet reaped. Finished tasks are reaped on
  /// the next `spawn` or `settle`.
  pub fn pending(&self) -> usize {
    self.tasks.lock().map(|t| t.len()).unwrap_or(0)
  }

  /// Wait for every spawned task, including ones spawned while waiting.
  pub async fn settle(&self) {
    loop {
      let mut batch = match self.tasks.lock() {
        Ok(mut tasks) => std::mem::take(&mut *tasks),
        Err(_) => return,
      };
      if batch.is_empty() {
        return;
      }
      while let Some(result) = batch.join_next().await {
        if let Err(e) = result {
          tracing::warn!(error = %e, "Background task panicked");
        }
      }
    }
  }
}
