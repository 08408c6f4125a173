use serde::{Deserialize, Serialize};
use time::Date;

pub use crate::core::time::format_primitive;
use crate::db::models::Lesson;
use crate::db::types::{JobKind, LessonInputKind, LessonStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLessonInput {
    pub class_id: String,
    pub plan_id: Option<String>,
    pub subject: String,
    pub input_kind: LessonInputKind,
    /// S3 object key for audio input, inline reference otherwise.
    pub source_ref: String,
    pub held_on: Date,
}

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub id: String,
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
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            class_id: lesson.class_id,
            plan_id: lesson.plan_id,
            subject: lesson.subject,
            input_kind: lesson.input_kind,
            source_ref: lesson.source_ref,
            held_on: lesson.held_on,
            status: lesson.status,
            transcript_text: lesson.transcript_text,
            error_reason: lesson.error_reason,
            error_stage: lesson.error_stage,
            created_at: format_primitive(lesson.created_at),
            updated_at: format_primitive(lesson.updated_at),
        }
    }
}
