use std::time::Duration;

use serde::Serialize;

use crate::core::config::NotificationSettings;

/// Review verdict event posted to the tenant webhook after commit.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEvent {
    pub tenant_id: String,
    pub lesson_id: String,
    pub analysis_id: String,
    pub verdict: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Fire-and-forget webhook notifier. Delivery failures are logged and never
/// surfaced to the caller; the review itself has already committed.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url: settings.webhook_url.clone(),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: None,
        }
    }

    /// Spawns the delivery so the caller returns without waiting on the
    /// webhook endpoint.
    pub fn send_detached(&self, event: ReviewEvent) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = client.post(&url).json(&event).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        lesson_id = %event.lesson_id,
                        verdict = event.verdict,
                        "Review notification delivered"
                    );
                }
                Ok(response) => {
                    tracing::warn!(
                        lesson_id = %event.lesson_id,
                        status = %response.status(),
                        "Review notification rejected by webhook"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        lesson_id = %event.lesson_id,
                        error = %e,
                        "Review notification delivery failed"
                    );
                }
            }
        });
    }
}
