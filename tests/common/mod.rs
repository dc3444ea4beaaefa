//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use buildhook::build::runner::LineSink;
use buildhook::build::{
    BuildCommand, BuildExecutor, BuildRun, ProcessOutcome, ProcessRunner, ProcessSpec,
    StatusStore, Stream,
};
use buildhook::notify::{FailureReport, Notifier};

/// Write an executable bash script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/bash").unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

/// Poll the store until the current run reaches a terminal state.
pub async fn wait_for_terminal(store: &StatusStore, limit: Duration) -> BuildRun {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let snap = store.snapshot();
        if snap.state.is_terminal() {
            return snap;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("build did not finish within {:?}: {:?}", limit, snap);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Notifier that keeps every report it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub reports: Mutex<Vec<FailureReport>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &FailureReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Process runner that replays canned output instead of spawning anything.
pub struct FakeRunner {
    pub lines: Vec<(Stream, String)>,
    pub outcome: ProcessOutcome,
    pub delay: Duration,
    pub specs: Mutex<Vec<ProcessSpec>>,
}

impl FakeRunner {
    pub fn new(lines: &[(Stream, &str)], outcome: ProcessOutcome) -> Self {
        Self {
            lines: lines
                .iter()
                .map(|(s, l)| (*s, l.to_string()))
                .collect(),
            outcome,
            delay: Duration::ZERO,
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn specs(&self) -> Vec<ProcessSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &ProcessSpec, sink: &mut LineSink<'_>) -> ProcessOutcome {
        self.specs.lock().unwrap().push(spec.clone());
        for (stream, line) in &self.lines {
            sink(*stream, line.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Executor over a fresh store, with a recording notifier.
pub fn executor_with(
    runner: Arc<dyn ProcessRunner>,
    command: BuildCommand,
) -> (Arc<StatusStore>, Arc<RecordingNotifier>, Arc<BuildExecutor>) {
    let store = Arc::new(StatusStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = Arc::new(BuildExecutor::new(
        store.clone(),
        runner,
        notifier.clone(),
        command,
    ));
    (store, notifier, executor)
}
