pub mod analysis_engine;
pub mod approval;
pub mod coverage;
pub mod dispatch;
pub mod exercise_rules;
pub mod lessons;
pub mod lifecycle;
pub mod notifications;
pub mod report_diff;
pub mod storage;
pub mod transcription;
