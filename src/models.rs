use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Learner {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

/// One module open/view. `last_viewed` stays empty until the learner
/// engages with the module after opening it.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub first_opened_at: Option<DateTime<Utc>>,
    pub last_viewed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ExamScore {
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    Passed,
    Failed,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Passed => "passed",
            SubmissionStatus::Failed => "failed",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown submission status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "passed" => Ok(SubmissionStatus::Passed),
            "failed" => Ok(SubmissionStatus::Failed),
            "rejected" => Ok(SubmissionStatus::Rejected),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
}

/// A completed course enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentSpan {
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Everything the pipeline reads for a single learner.
#[derive(Debug, Clone, Default)]
pub struct LearnerHistory {
    pub activity: Vec<ActivityEvent>,
    pub exams: Vec<ExamScore>,
    pub submissions: Vec<SubmissionOutcome>,
    pub enrollments: Vec<EnrollmentSpan>,
}

// Field names are the wire contract of the persona classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaFeatures {
    pub avg_study_hour: f64,
    pub study_consistency_std: f64,
    pub completion_speed: f64,
    pub avg_exam_score: f64,
    pub submission_fail_rate: f64,
    pub retry_count: u64,
}

// Field names are the wire contract of the pace classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaceFeatures {
    pub completion_speed: f64,
    pub study_consistency_std: f64,
    pub avg_study_hour: f64,
    pub completed_modules: u64,
    pub total_modules_viewed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDensity {
    pub materials_per_day: f64,
    pub weekly_cv: f64,
    pub active_days: usize,
    pub active_weeks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerFeatures {
    pub persona_features: PersonaFeatures,
    pub pace_features: PaceFeatures,
    /// Computed alongside the vectors but not sent to the classifier.
    #[serde(skip)]
    pub activity: ActivityDensity,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct InsightClassification {
    pub persona: Classification,
    pub pace: Classification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_ignores_case_and_padding() {
        assert_eq!(" FAILED ".parse::<SubmissionStatus>(), Ok(SubmissionStatus::Failed));
        assert_eq!("Passed".parse::<SubmissionStatus>(), Ok(SubmissionStatus::Passed));
        assert_eq!(
            "retry".parse::<SubmissionStatus>(),
            Err(UnknownStatus("retry".to_string()))
        );
    }

    #[test]
    fn status_round_trips_through_its_stored_form() {
        for status in [
            SubmissionStatus::Submitted,
            SubmissionStatus::Passed,
            SubmissionStatus::Failed,
            SubmissionStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<SubmissionStatus>(), Ok(status));
        }
    }
}
