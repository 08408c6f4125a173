use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{Analysis, CoverageEvidence};
use crate::db::types::AnalysisStatus;

/// The exercise-set payload stored on an analysis and accepted from edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub questions: Vec<ExerciseQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseQuestion {
    pub statement: String,
    pub explanation: String,
    pub options: Vec<ExerciseOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseOption {
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub id: String,
    pub lesson_id: String,
    pub coverage: Vec<CoverageEvidence>,
    pub evaluation: serde_json::Value,
    pub report_text: String,
    pub report_text_edited: Option<String>,
    pub exercises: serde_json::Value,
    pub exercises_edited: Option<serde_json::Value>,
    pub alerts: serde_json::Value,
    pub status: AnalysisStatus,
    pub approved_at: Option<String>,
    pub rejected_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub review_duration_seconds: Option<f64>,
    pub model_version: String,
    pub prompt_version: String,
    pub created_at: String,
}

impl From<Analysis> for AnalysisResponse {
    fn from(analysis: Analysis) -> Self {
        Self {
            id: analysis.id,
            lesson_id: analysis.lesson_id,
            coverage: analysis.coverage.0,
            evaluation: analysis.evaluation.0,
            report_text: analysis.report_text,
            report_text_edited: analysis.report_text_edited,
            exercises: analysis.exercises.0,
            exercises_edited: analysis.exercises_edited.map(|value| value.0),
            alerts: analysis.alerts.0,
            status: analysis.status,
            approved_at: analysis.approved_at.map(format_primitive),
            rejected_at: analysis.rejected_at.map(format_primitive),
            rejection_reason: analysis.rejection_reason,
            review_duration_seconds: analysis.review_duration_seconds,
            model_version: analysis.model_version,
            prompt_version: analysis.prompt_version,
            created_at: format_primitive(analysis.created_at),
        }
    }
}
