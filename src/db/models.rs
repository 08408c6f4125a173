use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::{Date, PrimitiveDateTime};

use crate::db::types::{
    AnalysisStatus, FeedbackKind, JobKind, JobStatus, LessonInputKind, LessonStatus,
    ObjectiveProvenance,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lesson {
    pub id: String,
    pub tenant_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub plan_id: Option<String>,
    pub subject: String,
    pub input_kind: LessonInputKind,
    pub source_ref: String,
    pub held_on: Date,
    pub status: LessonStatus,
    pub transcript_text: Option<String>,
    pub error_reason: Option<String>,
    pub error_stage: Option<JobKind>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Analysis {
    pub id: String,
    pub tenant_id: String,
    pub lesson_id: String,
    pub coverage: Json<Vec<CoverageEvidence>>,
    pub evaluation: Json<serde_json::Value>,
    pub report_text: String,
    pub report_text_edited: Option<String>,
    pub exercises: Json<serde_json::Value>,
    pub exercises_edited: Option<Json<serde_json::Value>>,
    pub alerts: Json<serde_json::Value>,
    pub status: AnalysisStatus,
    pub approved_at: Option<PrimitiveDateTime>,
    pub rejected_at: Option<PrimitiveDateTime>,
    pub rejection_reason: Option<String>,
    pub review_duration_seconds: Option<f64>,
    pub model_version: String,
    pub prompt_version: String,
    pub cost_cents: Option<f64>,
    pub processing_seconds: Option<f64>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

/// One evidence entry in the analysis coverage blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageEvidence {
    pub objective_code: String,
    pub status: EvidenceStatus,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Complete,
    Partial,
    NotCovered,
}

impl EvidenceStatus {
    /// Complete and partial evidence both count an objective as covered.
    pub fn counts_as_covered(self) -> bool {
        matches!(self, EvidenceStatus::Complete | EvidenceStatus::Partial)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearningObjective {
    pub id: String,
    pub tenant_id: Option<String>,
    pub class_id: Option<String>,
    pub code: String,
    pub subject: String,
    pub grade_min: i32,
    pub grade_max: i32,
    pub description: String,
    pub provenance: ObjectiveProvenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: String,
    pub tenant_id: String,
    pub class_id: String,
    pub subject: String,
    pub period: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub active: bool,
    pub created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanObjective {
    pub plan_id: String,
    pub objective_id: String,
    pub weight: f64,
    pub expected_lessons: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: String,
    pub tenant_id: String,
    pub lesson_id: Option<String>,
    pub kind: JobKind,
    pub payload: Json<serde_json::Value>,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: PrimitiveDateTime,
    pub started_at: Option<PrimitiveDateTime>,
    pub finished_at: Option<PrimitiveDateTime>,
    pub last_error: Option<String>,
    pub idempotency_key: String,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackSignal {
    pub id: String,
    pub tenant_id: String,
    pub analysis_id: String,
    pub kind: FeedbackKind,
    pub payload: Json<serde_json::Value>,
    pub created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoverageViewRow {
    pub tenant_id: String,
    pub class_id: String,
    pub subject: String,
    pub period: String,
    pub planned_count: i32,
    pub covered_count: i32,
    pub percentage: f64,
    pub computed_at: PrimitiveDateTime,
}
