use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};

const HOURS_PER_DAY: f64 = 24.0;
const MAX_CIRCULAR_VARIANCE: f64 = 0.9999;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Zero when the mean is zero, so a flat zero series reads as no variability.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let avg = mean(values);
    if avg == 0.0 {
        return 0.0;
    }
    stddev(values) / avg
}

fn hour_to_angle(hour: f64) -> f64 {
    hour / HOURS_PER_DAY * 2.0 * PI
}

fn angle_to_hours(angle: f64) -> f64 {
    angle * HOURS_PER_DAY / (2.0 * PI)
}

/// Mean of the unit vectors `(sin, cos)` for each hour on the 24h clock.
fn mean_unit_vector(hours: &[f64]) -> (f64, f64) {
    let n = hours.len() as f64;
    let (sin_sum, cos_sum) = hours.iter().fold((0.0, 0.0), |(s, c), &h| {
        let theta = hour_to_angle(h);
        (s + theta.sin(), c + theta.cos())
    });
    (sin_sum / n, cos_sum / n)
}

/// Circular mean of hour-of-day values, in `[0, 24)`.
///
/// 23:00 and 01:00 average to midnight rather than noon.
pub fn circular_mean_hour(hours: &[f64]) -> f64 {
    if hours.is_empty() {
        return 0.0;
    }
    let (sin_mean, cos_mean) = mean_unit_vector(hours);
    let mut angle = sin_mean.atan2(cos_mean);
    if angle < 0.0 {
        angle += 2.0 * PI;
    }
    let hour = angle_to_hours(angle);
    if hour >= HOURS_PER_DAY {
        0.0
    } else {
        hour
    }
}

/// Circular standard deviation of hour-of-day values, in hours.
pub fn circular_std_hour(hours: &[f64]) -> f64 {
    if hours.len() < 2 {
        return 0.0;
    }
    let (sin_mean, cos_mean) = mean_unit_vector(hours);
    let resultant = (sin_mean.powi(2) + cos_mean.powi(2)).sqrt();
    let variance = (1.0 - resultant).clamp(0.0, MAX_CIRCULAR_VARIANCE);
    let std_radians = (-2.0 * (1.0 - variance).ln()).sqrt();
    angle_to_hours(std_radians)
}

/// ISO-8601 week label such as `2026-W1`. The year is the ISO week-year, so
/// 2025-12-29 and 2026-01-01 share the bucket `2026-W1`.
pub fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{}", week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hour_distance(a: f64, b: f64) -> f64 {
        let diff = (a - b).abs() % HOURS_PER_DAY;
        diff.min(HOURS_PER_DAY - diff)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn mean_handles_empty_and_small_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[10.0]), 10.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn stddev_is_bessel_corrected() {
        assert_eq!(stddev(&[]), 0.0);
        assert_eq!(stddev(&[5.0]), 0.0);
        assert!((stddev(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        // population std of this series would be 2.0
        let sample = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((stddev(&sample) - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn cv_of_zero_series_is_zero() {
        let cv = coefficient_of_variation(&[0.0, 0.0, 0.0]);
        assert_eq!(cv, 0.0);
        assert!(cv.is_finite());
        assert_eq!(coefficient_of_variation(&[]), 0.0);
    }

    #[test]
    fn cv_scales_stddev_by_mean() {
        let cv = coefficient_of_variation(&[2.0, 4.0, 6.0]);
        assert!((cv - 0.5).abs() < 1e-12);
    }

    #[test]
    fn circular_mean_wraps_around_midnight() {
        let avg = circular_mean_hour(&[23.0, 1.0]);
        assert!((0.0..24.0).contains(&avg));
        assert!(hour_distance(avg, 0.0) < 1e-9, "got {avg}");
    }

    #[test]
    fn circular_mean_matches_plain_mean_away_from_midnight() {
        assert!((circular_mean_hour(&[9.0, 11.0]) - 10.0).abs() < 1e-9);
        assert!((circular_mean_hour(&[22.0]) - 22.0).abs() < 1e-9);
        assert_eq!(circular_mean_hour(&[]), 0.0);
    }

    #[test]
    fn circular_std_of_tiny_samples_is_zero() {
        assert_eq!(circular_std_hour(&[]), 0.0);
        assert_eq!(circular_std_hour(&[0.0]), 0.0);
        assert_eq!(circular_std_hour(&[17.5]), 0.0);
    }

    #[test]
    fn circular_std_separates_regular_from_erratic() {
        let identical = circular_std_hour(&[20.0, 20.0, 20.0, 20.0]);
        let clustered = circular_std_hour(&[23.5, 0.0, 0.5, 23.0, 1.0]);
        let spread: Vec<f64> = (0..24).map(f64::from).collect();
        let erratic = circular_std_hour(&spread);

        assert!(identical < 1e-3, "got {identical}");
        assert!(clustered < 1.0, "got {clustered}");
        assert!(erratic > 10.0, "got {erratic}");
    }

    #[test]
    fn week_key_follows_iso_year_at_boundaries() {
        // Monday 2025-12-29 through Sunday 2026-01-04 is ISO week 1 of 2026.
        assert_eq!(week_key(date(2025, 12, 29)), "2026-W1");
        assert_eq!(week_key(date(2025, 12, 31)), "2026-W1");
        assert_eq!(week_key(date(2026, 1, 4)), "2026-W1");
        assert_eq!(week_key(date(2026, 1, 5)), "2026-W2");
        // 2021-01-03 (Sunday) still belongs to 2020's week 53.
        assert_eq!(week_key(date(2021, 1, 3)), "2020-W53");
        assert_eq!(week_key(date(2020, 12, 28)), "2020-W53");
    }

    proptest! {
        #[test]
        fn circular_mean_stays_on_the_clock(hours in prop::collection::vec(0.0f64..24.0, 0..64)) {
            let avg = circular_mean_hour(&hours);
            prop_assert!((0.0..24.0).contains(&avg));
        }

        #[test]
        fn circular_std_is_finite_and_non_negative(hours in prop::collection::vec(0.0f64..24.0, 0..64)) {
            let std = circular_std_hour(&hours);
            prop_assert!(std.is_finite());
            prop_assert!(std >= 0.0);
        }
    }
}
