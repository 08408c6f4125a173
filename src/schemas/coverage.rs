use serde::{Deserialize, Serialize};
use time::Date;

/// A (class, subject, period) coverage scope.
#[derive(Debug, Clone, Deserialize)]
pub struct CoverageScope {
    pub class_id: String,
    pub subject: String,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub class_id: String,
    pub subject: String,
    pub period: String,
    pub planned_count: usize,
    pub covered_count: usize,
    pub percentage: f64,
}

/// One calendar-week bucket of the coverage timeline. `covered_cumulative`
/// counts distinct covered objectives up to and including this week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageWeekPoint {
    pub week_start: Date,
    pub lessons_held: usize,
    pub covered_cumulative: usize,
}
