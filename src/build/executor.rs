use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::build::error::{BuildFailure, classify};
use crate::build::runner::{ProcessRunner, ProcessSpec, Stream};
use crate::build::status::StatusStore;
use crate::build::types::RunId;
use crate::notify::{FailureReport, Notifier};

/// Hard limit on a single build.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Interpreter the build script is handed to.
pub const DEFAULT_INTERPRETER: &str = "/bin/bash";

/// The command line of a build: `<interpreter> <script> <action> <article_id>`.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub interpreter: PathBuf,
    pub script: PathBuf,
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

impl BuildCommand {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            script: script.into(),
            timeout: DEFAULT_BUILD_TIMEOUT,
            cwd: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spec(&self, action: &str, article_id: &str) -> ProcessSpec {
        ProcessSpec {
            program: self.interpreter.clone(),
            args: vec![
                self.script.to_string_lossy().to_string(),
                action.to_string(),
                article_id.to_string(),
            ],
            timeout: self.timeout,
            cwd: self.cwd.clone(),
        }
    }
}

/// Fails the run if the build future is dropped before recording an outcome,
/// so an aborted or panicked task cannot leave the store `Running`.
struct Unfinished<'a> {
    store: &'a StatusStore,
    run: RunId,
    armed: bool,
}

impl Unfinished<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Unfinished<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(run = %self.run, "Build task ended without an outcome");
            self.store
                .append_log(self.run, "Build failed: build task was interrupted");
            self.store.complete(self.run, false);
        }
    }
}

/// Drives one build attempt and records it in the `StatusStore`.
pub struct BuildExecutor {
    store: Arc<StatusStore>,
    runner: Arc<dyn ProcessRunner>,
    notifier: Arc<dyn Notifier>,
    command: BuildCommand,
}

impl BuildExecutor {
    pub fn new(
        store: Arc<StatusStore>,
        runner: Arc<dyn ProcessRunner>,
        notifier: Arc<dyn Notifier>,
        command: BuildCommand,
    ) -> Self {
        Self {
            store,
            runner,
            notifier,
            command,
        }
    }

    pub fn command(&self) -> &BuildCommand {
        &self.command
    }

    /// Start a new run in the store and execute it.
    pub async fn execute(&self, action: &str, article_id: &str) -> Result<Duration, BuildFailure> {
        let run = self.store.start(action, article_id);
        self.run(run, action, article_id).await
    }

    /// Execute a run that was already started in the store.
    ///
    /// Every outcome ends here: the store is completed, failures go to the
    /// notifier, and nothing is propagated beyond the returned value.
    pub async fn run(
        &self,
        run: RunId,
        action: &str,
        article_id: &str,
    ) -> Result<Duration, BuildFailure> {
        let started = Instant::now();
        let mut unfinished = Unfinished {
            store: &*self.store,
            run,
            armed: true,
        };
        info!(run = %run, action = %action, article_id = %article_id, "Starting build");
        self.store.append_log(
            run,
            format!("Build started: action={}, articleID={}", action, article_id),
        );

        let spec = self.command.spec(action, article_id);
        let store = &self.store;
        let outcome = self
            .runner
            .run(&spec, &mut |_stream: Stream, line: String| {
                store.append_log(run, line)
            })
            .await;

        let duration = started.elapsed();

        match classify(outcome) {
            Ok(()) => {
                info!(
                    run = %run,
                    action = %action,
                    article_id = %article_id,
                    duration_ms = duration.as_millis() as u64,
                    "Build succeeded"
                );
                self.store
                    .append_log(run, format!("Build success! Duration: {:.2?}", duration));
                self.store.complete(run, true);
                unfinished.disarm();
                Ok(duration)
            }
            Err(failure) => {
                error!(
                    run = %run,
                    action = %action,
                    article_id = %article_id,
                    duration_ms = duration.as_millis() as u64,
                    kind = failure.kind(),
                    error = %failure,
                    "Build failed"
                );
                let output = match failure {
                    BuildFailure::Launch(_) => Vec::new(),
                    _ => self.store.logs_of(run),
                };
                self.store
                    .append_log(run, format!("Build failed: {}", failure));
                self.store.complete(run, false);
                unfinished.disarm();

                let report = FailureReport {
                    action: action.to_string(),
                    article_id: article_id.to_string(),
                    failure: failure.clone(),
                    duration,
                    output,
                };
                self.notifier.notify(&report).await;
                Err(failure)
            }
        }
    }
}
