use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::build::types::{BuildRun, BuildState, RunId};

/// Default number of log lines kept for the current run.
pub const DEFAULT_MAX_LOG_LINES: usize = 1000;

/// In-memory record of the live (or most recent) build.
///
/// Exactly one run is held at a time. `start` replaces it wholesale; log
/// appends and completion are tagged with the `RunId` they belong to, so a
/// straggling writer from a superseded run can never touch the new record.
///
/// The log is a ring buffer: once `max_lines` is reached the oldest line is
/// evicted and `truncated` is incremented.
pub struct StatusStore {
    max_lines: usize,
    inner: RwLock<Record>,
}

#[derive(Default)]
struct Record {
    id: Option<RunId>,
    state: BuildState,
    logs: VecDeque<String>,
    truncated: usize,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    action: String,
    article_id: String,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOG_LINES)
    }

    /// Create a store that keeps at most `max_lines` log lines (minimum 1).
    pub fn with_capacity(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            inner: RwLock::new(Record::default()),
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Begin a new run, discarding whatever record was there before.
    pub fn start(&self, action: &str, article_id: &str) -> RunId {
        let mut record = self.write();
        Self::reset(&mut record, action, article_id)
    }

    /// Begin a new run unless one is already running.
    pub fn try_start(&self, action: &str, article_id: &str) -> Option<RunId> {
        let mut record = self.write();
        if record.state == BuildState::Running {
            return None;
        }
        Some(Self::reset(&mut record, action, article_id))
    }

    /// Append one line to the log of `run`. Ignored if `run` was superseded.
    pub fn append_log(&self, run: RunId, line: impl Into<String>) {
        let mut record = self.write();
        if record.id != Some(run) {
            return;
        }
        if record.logs.len() >= self.max_lines {
            record.logs.pop_front();
            record.truncated += 1;
        }
        record.logs.push_back(line.into());
    }

    /// Mark `run` as finished. Ignored if `run` was superseded.
    pub fn complete(&self, run: RunId, success: bool) {
        let mut record = self.write();
        if record.id != Some(run) {
            return;
        }
        record.end_time = Some(Utc::now());
        record.state = if success {
            BuildState::Success
        } else {
            BuildState::Failed
        };
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> BuildRun {
        let record = self.read();
        BuildRun {
            id: record.id,
            state: record.state,
            logs: record.logs.iter().cloned().collect(),
            truncated: record.truncated,
            start_time: record.start_time,
            end_time: record.end_time,
            action: record.action.clone(),
            article_id: record.article_id.clone(),
        }
    }

    pub fn state(&self) -> BuildState {
        self.read().state
    }

    /// Log lines of `run`, or empty if `run` is no longer current.
    pub fn logs_of(&self, run: RunId) -> Vec<String> {
        let record = self.read();
        if record.id != Some(run) {
            return Vec::new();
        }
        record.logs.iter().cloned().collect()
    }

    fn reset(record: &mut Record, action: &str, article_id: &str) -> RunId {
        let id = Uuid::new_v4();
        *record = Record {
            id: Some(id),
            state: BuildState::Running,
            logs: VecDeque::new(),
            truncated: 0,
            start_time: Some(Utc::now()),
            end_time: None,
            action: action.to_string(),
            article_id: article_id.to_string(),
        };
        id
    }

    // Every mutation leaves the record consistent, so a poisoned lock is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn new_store_is_idle() {
        let store = StatusStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.state, BuildState::Idle);
        assert!(snap.logs.is_empty());
        assert!(snap.id.is_none());
        assert!(snap.start_time.is_none());
        assert!(snap.end_time.is_none());
    }

    #[test]
    fn start_sets_running_record() {
        let store = StatusStore::new();
        let run = store.start("update", "42");
        let snap = store.snapshot();
        assert_eq!(snap.id, Some(run));
        assert_eq!(snap.state, BuildState::Running);
        assert_eq!(snap.action, "update");
        assert_eq!(snap.article_id, "42");
        assert!(snap.start_time.is_some());
        assert!(snap.end_time.is_none());
    }

    #[test]
    fn complete_sets_terminal_state_and_end_time() {
        let store = StatusStore::new();
        let run = store.start("create", "1");
        store.complete(run, true);
        let snap = store.snapshot();
        assert_eq!(snap.state, BuildState::Success);
        assert!(snap.end_time.unwrap() >= snap.start_time.unwrap());

        let run = store.start("create", "1");
        store.complete(run, false);
        assert_eq!(store.state(), BuildState::Failed);
    }

    #[test]
    fn second_start_discards_previous_logs() {
        let store = StatusStore::new();
        let first = store.start("update", "1");
        store.append_log(first, "old line");
        store.complete(first, false);

        let second = store.start("delete", "2");
        store.append_log(second, "new line");

        let snap = store.snapshot();
        assert_eq!(snap.logs, vec!["new line".to_string()]);
        assert_eq!(snap.state, BuildState::Running);
        assert_eq!(snap.action, "delete");
    }

    #[test]
    fn writes_for_superseded_run_are_dropped() {
        let store = StatusStore::new();
        let first = store.start("update", "1");
        let second = store.start("update", "2");

        store.append_log(first, "late line from first run");
        store.complete(first, true);
        store.append_log(second, "line");

        let snap = store.snapshot();
        assert_eq!(snap.id, Some(second));
        assert_eq!(snap.state, BuildState::Running);
        assert_eq!(snap.logs, vec!["line".to_string()]);
        assert!(store.logs_of(first).is_empty());
    }

    #[test]
    fn try_start_rejects_while_running() {
        let store = StatusStore::new();
        let run = store.try_start("update", "1").unwrap();
        assert!(store.try_start("update", "2").is_none());
        assert_eq!(store.snapshot().article_id, "1");

        store.complete(run, true);
        assert!(store.try_start("update", "3").is_some());
        assert_eq!(store.snapshot().article_id, "3");
    }

    #[test]
    fn log_buffer_evicts_oldest_lines() {
        let store = StatusStore::with_capacity(3);
        let run = store.start("update", "");
        for i in 0..5 {
            store.append_log(run, format!("line {i}"));
        }
        let snap = store.snapshot();
        assert_eq!(snap.logs, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(snap.truncated, 2);
    }

    #[test]
    fn zero_capacity_keeps_one_line() {
        let store = StatusStore::with_capacity(0);
        assert_eq!(store.max_lines(), 1);
        let run = store.start("update", "");
        store.append_log(run, "a");
        store.append_log(run, "b");
        assert_eq!(store.snapshot().logs, vec!["b"]);
    }

    #[test]
    fn concurrent_readers_see_whole_lines() {
        let store = Arc::new(StatusStore::new());
        let run = store.start("update", "7");

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.append_log(run, format!("line-{i:04}"));
                }
                store.complete(run, true);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = store.snapshot();
                        assert_ne!(snap.state, BuildState::Idle);
                        for line in &snap.logs {
                            assert_eq!(line.len(), "line-0000".len());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        let snap = store.snapshot();
        assert_eq!(snap.state, BuildState::Success);
        assert_eq!(snap.logs.len(), 500);
    }
}
