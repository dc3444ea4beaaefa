use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::{FailureReport, Notifier};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Fire-and-forget JSON POST. Outcome is only logged.
fn post_detached<T>(client: reqwest::Client, url: String, payload: T, what: &'static str)
where
    T: Serialize + Send + 'static,
{
    tokio::spawn(async move {
        match client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, what, "Webhook delivered");
            }
            Ok(response) => {
                warn!(url = %url, what, status = %response.status(), "Webhook rejected");
            }
            Err(e) => {
                error!(url = %url, what, error = %e, "Failed to send webhook");
            }
        }
    });
}

#[derive(Serialize)]
struct TextPayload {
    text: String,
}

/// Posts failure reports to a chat incoming-webhook (`{"text": ...}`).
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: http_client(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &FailureReport) {
        let payload = TextPayload {
            text: report.render(),
        };
        post_detached(
            self.client.clone(),
            self.url.clone(),
            payload,
            "build_failure",
        );
    }
}

/// Payload announcing a content change that needs a site rebuild.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildEvent {
    pub action: String,
    pub article_id: String,
    pub timestamp: String,
}

impl BuildEvent {
    pub fn now(action: &str, article_id: &str) -> Self {
        Self {
            action: action.to_string(),
            article_id: article_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Forwards every build trigger to a remote build service.
#[derive(Clone)]
pub struct BuildWebhook {
    url: String,
    client: reqwest::Client,
}

impl BuildWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: http_client(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post the event in the background; returns immediately.
    pub fn send(&self, action: &str, article_id: &str) {
        post_detached(
            self.client.clone(),
            self.url.clone(),
            BuildEvent::now(action, article_id),
            "build_trigger",
        );
    }
}
