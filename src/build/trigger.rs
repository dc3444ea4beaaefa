// std::sync::Mutex is fine here: the lock is never held across an .await.
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::build::executor::BuildExecutor;
use crate::build::status::StatusStore;
use crate::notify::BuildWebhook;

/// Public entry point for content-change handlers.
///
/// `trigger` never blocks and never reports back: a missing build script or
/// an already-running build are logged and otherwise ignored, and every
/// build outcome is only observable through the `StatusStore`.
///
/// At most one build runs at a time. A trigger that arrives while a build is
/// `Running` is rejected rather than queued.
pub struct BuildTrigger {
    store: Arc<StatusStore>,
    executor: Option<Arc<BuildExecutor>>,
    webhook: Option<BuildWebhook>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl BuildTrigger {
    /// `executor` is `None` when no build script is configured, which turns
    /// every trigger into a logged no-op.
    pub fn new(store: Arc<StatusStore>, executor: Option<Arc<BuildExecutor>>) -> Self {
        Self {
            store,
            executor,
            webhook: None,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Also forward every trigger to a remote build webhook.
    pub fn with_webhook(mut self, webhook: BuildWebhook) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.executor.is_some()
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Schedule a build for `action` on `article_id` and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, action: &str, article_id: &str) {
        if let Some(ref webhook) = self.webhook {
            webhook.send(action, article_id);
        }

        let Some(ref executor) = self.executor else {
            info!(action = %action, article_id = %article_id, "No build script configured, skipping build");
            return;
        };

        info!(action = %action, article_id = %article_id, "Build requested");

        let Some(run) = self.store.try_start(action, article_id) else {
            warn!(action = %action, article_id = %article_id, "A build is already running, ignoring trigger");
            return;
        };

        let executor = executor.clone();
        let action = action.to_string();
        let article_id = article_id.to_string();
        let handle = tokio::spawn(async move {
            // The outcome is recorded in the store and reported by the executor.
            let _ = executor.run(run, &action, &article_id).await;
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Number of build tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|h| !h.is_finished());
        in_flight.len()
    }

    /// Wait until every scheduled build has finished.
    pub async fn wait_idle(&self) {
        let handles: Vec<_> = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Build task panicked");
            }
        }
    }

    /// Let a running build finish before the process exits.
    pub async fn shutdown(&self) {
        let pending = self.pending();
        if pending == 0 {
            return;
        }
        info!(pending, "Waiting for running build to finish");
        self.wait_idle().await;
        info!("Build finished, shutting down");
    }
}
