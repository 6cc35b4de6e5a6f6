use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ActivityDensity, ActivityEvent, EnrollmentSpan, ExamScore, LearnerFeatures, LearnerHistory,
    PaceFeatures, PersonaFeatures, SubmissionOutcome, SubmissionStatus,
};
use crate::stats;

/// Course length, in hours, the pace classifier was calibrated against.
pub const REFERENCE_COMPLETION_HOURS: f64 = 20.0;
/// Completion speed reported when no enrollment has a usable duration.
pub const NEUTRAL_COMPLETION_SPEED: f64 = 1.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Read side of the learner history. Every query is keyed by learner and
/// independent of the others.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn activity_events(&self, learner_id: Uuid) -> Result<Vec<ActivityEvent>, StoreError>;
    async fn exam_scores(&self, learner_id: Uuid) -> Result<Vec<ExamScore>, StoreError>;
    async fn submission_outcomes(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<SubmissionOutcome>, StoreError>;
    async fn completed_enrollments(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<EnrollmentSpan>, StoreError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Offset used to read hour-of-day and calendar dates from timestamps.
    pub utc_offset: FixedOffset,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
        }
    }
}

pub async fn load_history<S>(store: &S, learner_id: Uuid) -> Result<LearnerHistory, StoreError>
where
    S: HistoryStore + ?Sized,
{
    let (activity, exams, submissions, enrollments) = tokio::try_join!(
        store.activity_events(learner_id),
        store.exam_scores(learner_id),
        store.submission_outcomes(learner_id),
        store.completed_enrollments(learner_id),
    )?;

    Ok(LearnerHistory {
        activity,
        exams,
        submissions,
        enrollments,
    })
}

pub async fn extract_features<S>(
    store: &S,
    learner_id: Uuid,
    options: &ExtractOptions,
) -> Result<LearnerFeatures, StoreError>
where
    S: HistoryStore + ?Sized,
{
    let history = load_history(store, learner_id).await?;
    debug!(
        %learner_id,
        activity = history.activity.len(),
        exams = history.exams.len(),
        submissions = history.submissions.len(),
        enrollments = history.enrollments.len(),
        "learner history loaded"
    );

    let features = compute_features(&history, options);
    debug!(
        %learner_id,
        materials_per_day = features.activity.materials_per_day,
        weekly_cv = features.activity.weekly_cv,
        "activity density computed"
    );
    Ok(features)
}

pub fn compute_features(history: &LearnerHistory, options: &ExtractOptions) -> LearnerFeatures {
    let hours = study_hours(&history.activity, options.utc_offset);
    let avg_study_hour = stats::circular_mean_hour(&hours);
    let study_consistency_std = stats::circular_std_hour(&hours);

    let scores: Vec<f64> = history.exams.iter().map(|exam| exam.score).collect();
    let avg_exam_score = stats::mean(&scores);

    let submission_fail_rate = submission_fail_rate(&history.submissions);
    let retry_count = retry_count(&history.submissions);
    let completion_speed = completion_speed(&history.enrollments);
    let activity = activity_density(&history.activity, options.utc_offset);

    let completed_modules = history
        .activity
        .iter()
        .filter(|event| event.last_viewed.is_some())
        .count() as u64;
    let total_modules_viewed = history.activity.len() as u64;

    LearnerFeatures {
        persona_features: PersonaFeatures {
            avg_study_hour,
            study_consistency_std,
            completion_speed,
            avg_exam_score,
            submission_fail_rate,
            retry_count,
        },
        pace_features: PaceFeatures {
            completion_speed,
            study_consistency_std,
            avg_study_hour,
            completed_modules,
            total_modules_viewed,
        },
        activity,
    }
}

fn local(timestamp: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    timestamp.with_timezone(&offset)
}

/// Hour of `last_viewed`; opens without engagement are skipped.
fn study_hours(events: &[ActivityEvent], offset: FixedOffset) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| event.last_viewed)
        .map(|viewed| f64::from(local(viewed, offset).hour()))
        .collect()
}

pub fn submission_fail_rate(submissions: &[SubmissionOutcome]) -> f64 {
    if submissions.is_empty() {
        return 0.0;
    }
    let failed = submissions
        .iter()
        .filter(|s| s.status == SubmissionStatus::Failed)
        .count();
    failed as f64 / submissions.len() as f64
}

pub fn retry_count(submissions: &[SubmissionOutcome]) -> u64 {
    submissions
        .iter()
        .filter(|s| matches!(s.status, SubmissionStatus::Failed | SubmissionStatus::Rejected))
        .count() as u64
}

pub fn completion_speed(enrollments: &[EnrollmentSpan]) -> f64 {
    let durations: Vec<f64> = enrollments
        .iter()
        .filter_map(|span| {
            let last = span.last_accessed_at?;
            let millis = (last - span.enrolled_at).num_milliseconds();
            if millis < 0 {
                warn!(
                    enrolled_at = %span.enrolled_at,
                    last_accessed_at = %last,
                    "enrollment accessed before it started, skipping"
                );
                return None;
            }
            Some(millis as f64 / MILLIS_PER_HOUR)
        })
        .collect();

    if durations.is_empty() {
        return NEUTRAL_COMPLETION_SPEED;
    }
    stats::mean(&durations) / REFERENCE_COMPLETION_HOURS
}

pub fn activity_density(events: &[ActivityEvent], offset: FixedOffset) -> ActivityDensity {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut per_week: BTreeMap<String, usize> = BTreeMap::new();

    for opened in events.iter().filter_map(|event| event.first_opened_at) {
        let day = local(opened, offset).date_naive();
        *per_day.entry(day).or_insert(0) += 1;
        *per_week.entry(stats::week_key(day)).or_insert(0) += 1;
    }

    let day_counts: Vec<f64> = per_day.values().map(|&count| count as f64).collect();
    let week_counts: Vec<f64> = per_week.values().map(|&count| count as f64).collect();

    ActivityDensity {
        materials_per_day: stats::mean(&day_counts),
        weekly_cv: stats::coefficient_of_variation(&week_counts),
        active_days: per_day.len(),
        active_weeks: per_week.len(),
    }
}
