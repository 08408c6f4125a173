use std::collections::{BTreeMap, HashSet};

use sqlx::PgPool;
use time::{Date, Duration};

use crate::core::context::RequestContext;
use crate::core::errors::CoreError;
use crate::core::time::primitive_now_utc;
use crate::db::models::{CoverageViewRow, Plan};
use crate::repositories;
use crate::repositories::coverage::ApprovedLessonEvidence;
use crate::schemas::coverage::{CoverageReport, CoverageScope, CoverageWeekPoint};

/// Live coverage for a plan scope, computed from approved analyses only.
/// Non-elevated callers see coverage over their own lessons; coordinators see
/// the whole class.
pub async fn get_coverage(
    pool: &PgPool,
    ctx: &RequestContext,
    scope: &CoverageScope,
) -> Result<CoverageReport, CoreError> {
    let (_plan, planned, evidence) = load_scope(pool, ctx, scope).await?;

    let covered = covered_codes(&planned, &evidence).len();
    Ok(CoverageReport {
        class_id: scope.class_id.clone(),
        subject: scope.subject.clone(),
        period: scope.period.clone(),
        planned_count: planned.len(),
        covered_count: covered,
        percentage: coverage_percentage(planned.len(), covered),
    })
}

/// Weekly coverage progression over the plan's date range. Weeks start on
/// Monday; weeks with no approved lessons produce no point.
pub async fn get_coverage_timeline(
    pool: &PgPool,
    ctx: &RequestContext,
    scope: &CoverageScope,
) -> Result<Vec<CoverageWeekPoint>, CoreError> {
    let (_plan, planned, evidence) = load_scope(pool, ctx, scope).await?;
    Ok(compute_timeline(&planned, &evidence))
}

/// The last materialized snapshot for a scope, if the refresh job has run.
pub async fn get_coverage_view(
    pool: &PgPool,
    ctx: &RequestContext,
    scope: &CoverageScope,
) -> Result<Option<CoverageViewRow>, CoreError> {
    let row = repositories::coverage::find_view(
        pool,
        ctx.tenant_id(),
        &scope.class_id,
        &scope.subject,
        &scope.period,
    )
    .await?;
    Ok(row)
}

/// Recomputes and upserts the materialized snapshot for one plan. Runs under
/// the refresh job's system context with class-wide visibility.
pub async fn refresh_view_for_plan(
    pool: &PgPool,
    ctx: &RequestContext,
    plan: &Plan,
) -> Result<(), CoreError> {
    let planned = repositories::objectives::list_codes_for_plan(pool, ctx.tenant_id(), &plan.id)
        .await?;
    let evidence = repositories::coverage::list_approved_evidence(
        pool,
        ctx.tenant_id(),
        &plan.class_id,
        &plan.subject,
        plan.starts_on,
        plan.ends_on,
        None,
    )
    .await?;

    let covered = covered_codes(&planned, &evidence).len();
    repositories::coverage::upsert_view(
        pool,
        &CoverageViewRow {
            tenant_id: ctx.tenant_id().to_string(),
            class_id: plan.class_id.clone(),
            subject: plan.subject.clone(),
            period: plan.period.clone(),
            planned_count: planned.len() as i32,
            covered_count: covered as i32,
            percentage: coverage_percentage(planned.len(), covered),
            computed_at: primitive_now_utc(),
        },
    )
    .await?;

    tracing::debug!(
        plan_id = %plan.id,
        class_id = %plan.class_id,
        covered,
        planned = planned.len(),
        "Coverage view refreshed"
    );

    Ok(())
}

async fn load_scope(
    pool: &PgPool,
    ctx: &RequestContext,
    scope: &CoverageScope,
) -> Result<(Plan, Vec<String>, Vec<ApprovedLessonEvidence>), CoreError> {
    let plan = repositories::plans::find_active_for_scope(
        pool,
        ctx.tenant_id(),
        &scope.class_id,
        &scope.subject,
        &scope.period,
    )
    .await?
    .ok_or(CoreError::NotFound)?;

    let planned =
        repositories::objectives::list_codes_for_plan(pool, ctx.tenant_id(), &plan.id).await?;

    let teacher_filter = if ctx.is_elevated() { None } else { Some(ctx.user_id()) };
    let evidence = repositories::coverage::list_approved_evidence(
        pool,
        ctx.tenant_id(),
        &scope.class_id,
        &scope.subject,
        plan.starts_on,
        plan.ends_on,
        teacher_filter,
    )
    .await?;

    Ok((plan, planned, evidence))
}

/// Distinct planned objective codes with at least one covering evidence
/// entry. Codes outside the plan are ignored.
fn covered_codes<'a>(
    planned: &'a [String],
    evidence: &'a [ApprovedLessonEvidence],
) -> HashSet<&'a str> {
    let planned_set: HashSet<&str> = planned.iter().map(String::as_str).collect();
    evidence
        .iter()
        .flat_map(|lesson| lesson.coverage.0.iter())
        .filter(|entry| entry.status.counts_as_covered())
        .map(|entry| entry.objective_code.as_str())
        .filter(|code| planned_set.contains(code))
        .collect()
}

/// Covered percentage rounded to two decimals; an empty plan is 0%, not a
/// division error.
fn coverage_percentage(planned: usize, covered: usize) -> f64 {
    if planned == 0 {
        return 0.0;
    }
    let raw = covered as f64 / planned as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

fn week_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
}

fn compute_timeline(
    planned: &[String],
    evidence: &[ApprovedLessonEvidence],
) -> Vec<CoverageWeekPoint> {
    let planned_set: HashSet<&str> = planned.iter().map(String::as_str).collect();

    let mut weeks: BTreeMap<Date, Vec<&ApprovedLessonEvidence>> = BTreeMap::new();
    for lesson in evidence {
        weeks.entry(week_start(lesson.held_on)).or_default().push(lesson);
    }

    let mut covered_so_far: HashSet<&str> = HashSet::new();
    let mut points = Vec::with_capacity(weeks.len());
    for (week, lessons) in weeks {
        for lesson in &lessons {
            for entry in lesson.coverage.0.iter() {
                if entry.status.counts_as_covered()
                    && planned_set.contains(entry.objective_code.as_str())
                {
                    covered_so_far.insert(entry.objective_code.as_str());
                }
            }
        }
        points.push(CoverageWeekPoint {
            week_start: week,
            lessons_held: lessons.len(),
            covered_cumulative: covered_so_far.len(),
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::Month;

    use crate::db::models::{CoverageEvidence, EvidenceStatus};

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    fn lesson(
        id: &str,
        held_on: Date,
        entries: Vec<(&str, EvidenceStatus)>,
    ) -> ApprovedLessonEvidence {
        ApprovedLessonEvidence {
            lesson_id: id.to_string(),
            held_on,
            coverage: Json(
                entries
                    .into_iter()
                    .map(|(code, status)| CoverageEvidence {
                        objective_code: code.to_string(),
                        status,
                        evidence: None,
                    })
                    .collect(),
            ),
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(coverage_percentage(10, 7), 70.0);
        assert_eq!(coverage_percentage(3, 1), 33.33);
        assert_eq!(coverage_percentage(3, 2), 66.67);
    }

    #[test]
    fn empty_plan_is_zero_percent() {
        assert_eq!(coverage_percentage(0, 0), 0.0);
    }

    #[test]
    fn covered_codes_dedup_and_ignore_off_plan_entries() {
        let planned = codes(&["M1", "M2", "M3"]);
        let evidence = vec![
            lesson(
                "l1",
                date(2026, Month::March, 2),
                vec![
                    ("M1", EvidenceStatus::Complete),
                    ("M2", EvidenceStatus::NotCovered),
                    ("X9", EvidenceStatus::Complete),
                ],
            ),
            lesson(
                "l2",
                date(2026, Month::March, 3),
                vec![("M1", EvidenceStatus::Partial), ("M2", EvidenceStatus::Partial)],
            ),
        ];

        let covered = covered_codes(&planned, &evidence);
        assert_eq!(covered.len(), 2);
        assert!(covered.contains("M1"));
        assert!(covered.contains("M2"));
        assert!(!covered.contains("X9"));
    }

    #[test]
    fn week_start_is_monday() {
        // 2026-03-04 is a Wednesday.
        assert_eq!(week_start(date(2026, Month::March, 4)), date(2026, Month::March, 2));
        // Monday maps to itself.
        assert_eq!(week_start(date(2026, Month::March, 2)), date(2026, Month::March, 2));
        // Sunday belongs to the preceding Monday's week.
        assert_eq!(week_start(date(2026, Month::March, 8)), date(2026, Month::March, 2));
    }

    #[test]
    fn timeline_buckets_by_week_with_cumulative_distinct_coverage() {
        let planned = codes(&["M1", "M2", "M3", "M4"]);
        let evidence = vec![
            lesson(
                "l1",
                date(2026, Month::March, 2),
                vec![("M1", EvidenceStatus::Complete)],
            ),
            lesson(
                "l2",
                date(2026, Month::March, 4),
                vec![("M1", EvidenceStatus::Complete), ("M2", EvidenceStatus::Partial)],
            ),
            // Next week, one lesson; repeats M2 and adds M3.
            lesson(
                "l3",
                date(2026, Month::March, 11),
                vec![("M2", EvidenceStatus::Complete), ("M3", EvidenceStatus::Complete)],
            ),
        ];

        let timeline = compute_timeline(&planned, &evidence);
        assert_eq!(
            timeline,
            vec![
                CoverageWeekPoint {
                    week_start: date(2026, Month::March, 2),
                    lessons_held: 2,
                    covered_cumulative: 2,
                },
                CoverageWeekPoint {
                    week_start: date(2026, Month::March, 9),
                    lessons_held: 1,
                    covered_cumulative: 3,
                },
            ]
        );
    }

    #[test]
    fn timeline_is_empty_without_evidence() {
        assert!(compute_timeline(&codes(&["M1"]), &[]).is_empty());
    }
}
