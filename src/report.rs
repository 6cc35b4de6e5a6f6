use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{InsightClassification, Learner, LearnerFeatures};

/// Renders a fractional hour-of-day as `HH:MM`.
pub fn format_hour(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round() as i64;
    let total_minutes = total_minutes.rem_euclid(24 * 60);
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

pub fn build_report(
    learner: &Learner,
    generated_at: DateTime<Utc>,
    features: &LearnerFeatures,
    classification: Option<&InsightClassification>,
) -> String {
    let persona = &features.persona_features;
    let pace = &features.pace_features;
    let activity = &features.activity;

    let mut output = String::new();

    let _ = writeln!(output, "# Learner Insight Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) at {}",
        learner.full_name,
        learner.email,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Study Rhythm");
    if pace.completed_modules == 0 {
        let _ = writeln!(output, "No viewed modules recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "- Typical study time {} (spread {:.1}h)",
            format_hour(persona.avg_study_hour),
            persona.study_consistency_std
        );
    }
    let _ = writeln!(
        output,
        "- {} of {} opened modules viewed",
        pace.completed_modules, pace.total_modules_viewed
    );
    let _ = writeln!(
        output,
        "- {:.1} materials per active day over {} days, weekly CV {:.2} across {} weeks",
        activity.materials_per_day, activity.active_days, activity.weekly_cv, activity.active_weeks
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance");
    let _ = writeln!(output, "- Average exam score {:.1}", persona.avg_exam_score);
    let _ = writeln!(
        output,
        "- Submission fail rate {:.0}% with {} retries",
        persona.submission_fail_rate * 100.0,
        persona.retry_count
    );
    let _ = writeln!(
        output,
        "- Completion speed {:.2}x the reference course length",
        persona.completion_speed
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classification");
    match classification {
        Some(result) => {
            let _ = writeln!(
                output,
                "- Persona: {} ({:.0}% confidence)",
                result.persona.label,
                result.persona.confidence * 100.0
            );
            let _ = writeln!(
                output,
                "- Pace: {} ({:.0}% confidence)",
                result.pace.label,
                result.pace.confidence * 100.0
            );
        }
        None => {
            let _ = writeln!(output, "Not requested.");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityDensity, Classification, PaceFeatures, PersonaFeatures};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sample_features(completed_modules: u64) -> LearnerFeatures {
        LearnerFeatures {
            persona_features: PersonaFeatures {
                avg_study_hour: 23.75,
                study_consistency_std: 0.8,
                completion_speed: 1.25,
                avg_exam_score: 68.5,
                submission_fail_rate: 1.0 / 3.0,
                retry_count: 2,
            },
            pace_features: PaceFeatures {
                completion_speed: 1.25,
                study_consistency_std: 0.8,
                avg_study_hour: 23.75,
                completed_modules,
                total_modules_viewed: 4,
            },
            activity: ActivityDensity {
                materials_per_day: 1.0,
                weekly_cv: 0.0,
                active_days: 4,
                active_weeks: 2,
            },
        }
    }

    fn learner() -> Learner {
        Learner {
            id: Uuid::new_v4(),
            full_name: "Avery Lee".to_string(),
            email: "avery@example.edu".to_string(),
        }
    }

    #[test]
    fn hours_render_as_clock_time() {
        assert_eq!(format_hour(0.0), "00:00");
        assert_eq!(format_hour(9.5), "09:30");
        assert_eq!(format_hour(23.75), "23:45");
        assert_eq!(format_hour(23.999), "00:00");
    }

    #[test]
    fn report_lists_features_and_classification() {
        let generated_at = Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap();
        let classification = InsightClassification {
            persona: Classification {
                label: "night_owl".to_string(),
                confidence: 0.81,
            },
            pace: Classification {
                label: "deep_learner".to_string(),
                confidence: 0.64,
            },
        };

        let report = build_report(&learner(), generated_at, &sample_features(3), Some(&classification));

        assert!(report.contains("Generated for Avery Lee (avery@example.edu) at 2026-02-14 10:00 UTC"));
        assert!(report.contains("Typical study time 23:45 (spread 0.8h)"));
        assert!(report.contains("3 of 4 opened modules viewed"));
        assert!(report.contains("Submission fail rate 33% with 2 retries"));
        assert!(report.contains("Completion speed 1.25x"));
        assert!(report.contains("Persona: night_owl (81% confidence)"));
        assert!(report.contains("Pace: deep_learner (64% confidence)"));
    }

    #[test]
    fn report_handles_learner_without_views() {
        let generated_at = Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap();
        let report = build_report(&learner(), generated_at, &sample_features(0), None);

        assert!(report.contains("No viewed modules recorded yet."));
        assert!(report.contains("Not requested."));
    }
}
