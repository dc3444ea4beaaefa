//! Delivery of build failure reports.
//!
//! The executor hands every failed run to a [`Notifier`]. Implementations
//! must not fail or stall the build: delivery errors are logged and dropped.

pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::build::error::BuildFailure;

pub use webhook::{BuildWebhook, WebhookNotifier};

/// Number of trailing output lines included in a rendered report.
pub const REPORT_OUTPUT_LINES: usize = 50;

/// Everything a notifier gets to know about a failed build.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub action: String,
    pub article_id: String,
    pub failure: BuildFailure,
    pub duration: Duration,
    /// Captured combined output; empty when the build never launched.
    pub output: Vec<String>,
}

impl FailureReport {
    /// Human-readable multi-line message.
    pub fn render(&self) -> String {
        let skip = self.output.len().saturating_sub(REPORT_OUTPUT_LINES);
        let output = if self.output.is_empty() {
            "(no output)".to_string()
        } else {
            self.output[skip..].join("\n")
        };

        let mut msg = format!(
            "Site build failed\nAction: {}\nArticle ID: {}\nError: {}\nDuration: {:.2?}\nOutput:\n",
            self.action, self.article_id, self.failure, self.duration
        );
        if skip > 0 {
            msg.push_str(&format!("... ({} earlier lines omitted)\n", skip));
        }
        msg.push_str(&output);
        msg
    }
}

/// A channel that failure reports are delivered through.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &FailureReport);
}

/// Writes the report to the operational log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &FailureReport) {
        error!(
            action = %report.action,
            article_id = %report.article_id,
            kind = report.failure.kind(),
            "Build failure notification\n{}",
            report.render()
        );
    }
}

/// Delivers each report to every inner notifier, in order.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, report: &FailureReport) {
        for notifier in &self.notifiers {
            notifier.notify(report).await;
        }
    }
}
