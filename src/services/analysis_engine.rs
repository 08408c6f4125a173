use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::core::errors::JobFailure;
use crate::db::models::CoverageEvidence;

const PROMPT_VERSION: &str = "lesson-analysis-v3";

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub transcript: String,
    pub subject: String,
    pub class_id: String,
    pub planned_objectives: Vec<String>,
}

/// Everything the worker persists onto the Analysis row.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub coverage: Vec<CoverageEvidence>,
    pub evaluation: Value,
    pub report_text: String,
    pub exercises: Value,
    pub alerts: Value,
    pub model_version: String,
    pub prompt_version: String,
    pub cost_cents: Option<f64>,
    pub processing_seconds: f64,
}

/// Client for the LLM analysis engine that turns a transcript into coverage
/// evidence, a parent-facing report and practice exercises.
#[derive(Debug, Clone)]
pub struct AnalysisEngineService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnalysisEngineService {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.engines().analysis_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build analysis HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.engines().analysis_api_key.clone(),
            base_url: settings.engines().analysis_base_url.trim_end_matches('/').to_string(),
            model: settings.engines().analysis_model.clone(),
        })
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, JobFailure> {
        let timer = Instant::now();
        let endpoint = format!("{}/v1/analyze", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt_version": PROMPT_VERSION,
            "subject": request.subject,
            "class_id": request.class_id,
            "objectives": request.planned_objectives,
            "transcript": request.transcript,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| JobFailure::transient(anyhow::anyhow!(e).context("analysis request failed")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JobFailure::transient(anyhow::anyhow!(e).context("analysis response unreadable")))?;

        if status.is_client_error() {
            return Err(JobFailure::permanent(format!(
                "analysis engine rejected input (status {status}): {}",
                truncate(&body)
            )));
        }
        if !status.is_success() {
            return Err(JobFailure::transient(anyhow::anyhow!(
                "analysis engine returned status {status}: {}",
                truncate(&body)
            )));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            JobFailure::transient(anyhow::anyhow!("analysis engine returned non-JSON body: {e}"))
        })?;

        parse_outcome(&parsed, &self.model, timer.elapsed().as_secs_f64())
    }
}

/// The engine response is model output, so every field is checked rather
/// than trusted. A response missing the core fields is retried; the next
/// generation may well be valid.
fn parse_outcome(
    parsed: &Value,
    default_model: &str,
    processing_seconds: f64,
) -> Result<AnalysisOutcome, JobFailure> {
    let report_text = parsed
        .get("report_text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            JobFailure::transient(anyhow::anyhow!("analysis response missing report_text"))
        })?;
    if report_text.trim().is_empty() {
        return Err(JobFailure::transient(anyhow::anyhow!(
            "analysis response has empty report_text"
        )));
    }

    let coverage_value = parsed.get("coverage").cloned().unwrap_or_else(|| json!([]));
    let coverage: Vec<CoverageEvidence> =
        serde_json::from_value(coverage_value).map_err(|e| {
            JobFailure::transient(anyhow::anyhow!("analysis coverage block is malformed: {e}"))
        })?;

    let evaluation = parsed.get("evaluation").cloned().unwrap_or_else(|| json!({}));
    let exercises = parsed.get("exercises").cloned().unwrap_or_else(|| json!({}));
    let alerts = parsed.get("alerts").cloned().unwrap_or_else(|| json!([]));

    let model_version = parsed
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(default_model)
        .to_string();
    let cost_cents = parsed.get("cost_cents").and_then(Value::as_f64);

    Ok(AnalysisOutcome {
        coverage,
        evaluation,
        report_text,
        exercises,
        alerts,
        model_version,
        prompt_version: PROMPT_VERSION.to_string(),
        cost_cents,
        processing_seconds,
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::EvidenceStatus;

    #[test]
    fn parses_full_response() {
        let response = json!({
            "model": "engine-large-2",
            "report_text": "The class worked through fractions.",
            "coverage": [
                {"objective_code": "M3.2", "status": "complete", "evidence": "long division drill"},
                {"objective_code": "M3.4", "status": "not_covered"},
            ],
            "evaluation": {"pace": "good"},
            "exercises": {"questions": []},
            "alerts": ["noise in recording"],
            "cost_cents": 4.2,
        });

        let outcome = parse_outcome(&response, "fallback-model", 12.5).unwrap();
        assert_eq!(outcome.model_version, "engine-large-2");
        assert_eq!(outcome.coverage.len(), 2);
        assert_eq!(outcome.coverage[0].status, EvidenceStatus::Complete);
        assert_eq!(outcome.cost_cents, Some(4.2));
        assert_eq!(outcome.prompt_version, PROMPT_VERSION);
    }

    #[test]
    fn missing_report_is_retryable() {
        let response = json!({"coverage": []});
        let err = parse_outcome(&response, "m", 1.0).unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn malformed_coverage_is_retryable() {
        let response = json!({
            "report_text": "ok",
            "coverage": [{"objective_code": "M1", "status": "sort_of"}],
        });
        let err = parse_outcome(&response, "m", 1.0).unwrap_err();
        assert!(!err.is_permanent());
    }
}
