use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lessonstatus", rename_all = "snake_case")]
pub enum LessonStatus {
    Created,
    AwaitingTranscription,
    Transcribing,
    Transcribed,
    Analyzing,
    Analyzed,
    Approved,
    Rejected,
    Error,
}

impl LessonStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LessonStatus::Approved | LessonStatus::Rejected)
    }

    /// In-flight states are the ones background processing can still touch,
    /// and the only ones that may fall into `Error`.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            LessonStatus::AwaitingTranscription
                | LessonStatus::Transcribing
                | LessonStatus::Transcribed
                | LessonStatus::Analyzing
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lessoninputkind", rename_all = "snake_case")]
pub enum LessonInputKind {
    Audio,
    TranscriptText,
    ManualSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "analysisstatus", rename_all = "snake_case")]
pub enum AnalysisStatus {
    AwaitingReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "jobkind", rename_all = "snake_case")]
pub enum JobKind {
    Transcription,
    Analysis,
    ReportDiff,
    RejectionFeedback,
    CoverageRefresh,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Transcription => "transcription",
            JobKind::Analysis => "analysis",
            JobKind::ReportDiff => "report_diff",
            JobKind::RejectionFeedback => "rejection_feedback",
            JobKind::CoverageRefresh => "coverage_refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "jobstatus", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "objectiveprovenance", rename_all = "snake_case")]
pub enum ObjectiveProvenance {
    Standard,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "feedbackkind", rename_all = "snake_case")]
pub enum FeedbackKind {
    EditDiff,
    Rejection,
}
