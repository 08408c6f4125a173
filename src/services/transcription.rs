use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::core::errors::JobFailure;

/// Client for the speech-to-text engine. Only audio lessons go through it;
/// text inputs skip transcription entirely.
#[derive(Debug, Clone)]
pub struct TranscriptionService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TranscriptionService {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.engines().transcription_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build transcription HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.engines().transcription_api_key.clone(),
            base_url: settings.engines().transcription_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Transcribes the recording at `audio_url`, returning the transcript
    /// text. Client errors from the engine are permanent (the input itself
    /// is bad); everything else is worth a retry.
    pub async fn transcribe(&self, audio_url: &str) -> Result<String, JobFailure> {
        let endpoint = format!("{}/v1/transcriptions", self.base_url);
        let payload = json!({ "audio_url": audio_url });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| JobFailure::transient(anyhow::anyhow!(e).context("transcription request failed")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JobFailure::transient(anyhow::anyhow!(e).context("transcription response unreadable")))?;

        if status.is_client_error() {
            return Err(JobFailure::permanent(format!(
                "transcription engine rejected input (status {status}): {}",
                extract_error_message(&body)
            )));
        }
        if !status.is_success() {
            return Err(JobFailure::transient(anyhow::anyhow!(
                "transcription engine returned status {status}: {}",
                extract_error_message(&body)
            )));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            JobFailure::transient(anyhow::anyhow!("transcription engine returned non-JSON body: {e}"))
        })?;

        let text = parsed
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                JobFailure::transient(anyhow::anyhow!("transcription response missing text field"))
            })?;
        if text.trim().is_empty() {
            return Err(JobFailure::permanent(
                "transcription produced an empty transcript".to_string(),
            ));
        }

        Ok(text)
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .get("detail")
                .or_else(|| parsed.get("message"))
                .or_else(|| parsed.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_structured_detail() {
        assert_eq!(
            extract_error_message(r#"{"detail": "unsupported codec"}"#),
            "unsupported codec"
        );
        assert_eq!(extract_error_message("plain text error"), "plain text error");
    }
}
