use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::features::HistoryStore;
use crate::models::{
    ActivityEvent, EnrollmentSpan, ExamScore, Learner, SubmissionOutcome, SubmissionStatus,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed learner history, every query bounded by `query_timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn timed<T, F>(&self, query: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(|source| StoreError::Database { query, source }),
            Err(_) => Err(StoreError::Timeout {
                query,
                timeout: self.query_timeout,
            }),
        }
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn activity_events(&self, learner_id: Uuid) -> Result<Vec<ActivityEvent>, StoreError> {
        let rows = self
            .timed(
                "activity_events",
                sqlx::query(
                    "SELECT first_opened_at, last_viewed \
                     FROM learner_insight.module_activity \
                     WHERE learner_id = $1",
                )
                .bind(learner_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ActivityEvent {
                first_opened_at: row.get("first_opened_at"),
                last_viewed: row.get("last_viewed"),
            })
            .collect())
    }

    async fn exam_scores(&self, learner_id: Uuid) -> Result<Vec<ExamScore>, StoreError> {
        let rows = self
            .timed(
                "exam_scores",
                sqlx::query(
                    "SELECT score FROM learner_insight.exam_scores \
                     WHERE learner_id = $1 AND score IS NOT NULL",
                )
                .bind(learner_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ExamScore {
                score: row.get("score"),
            })
            .collect())
    }

    async fn submission_outcomes(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<SubmissionOutcome>, StoreError> {
        let rows = self
            .timed(
                "submission_outcomes",
                sqlx::query("SELECT status FROM learner_insight.submissions WHERE learner_id = $1")
                    .bind(learner_id)
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(parse_outcomes(
            learner_id,
            rows.iter().map(|row| row.get::<String, _>("status")),
        ))
    }

    async fn completed_enrollments(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<EnrollmentSpan>, StoreError> {
        let rows = self
            .timed(
                "completed_enrollments",
                sqlx::query(
                    "SELECT enrolled_at, last_accessed_at \
                     FROM learner_insight.enrollments \
                     WHERE learner_id = $1 AND status = 'completed'",
                )
                .bind(learner_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| EnrollmentSpan {
                enrolled_at: row.get("enrolled_at"),
                last_accessed_at: row.get("last_accessed_at"),
            })
            .collect())
    }
}

/// Unrecognised statuses are dropped, so they count toward neither the fail
/// rate nor its denominator.
fn parse_outcomes<I>(learner_id: Uuid, statuses: I) -> Vec<SubmissionOutcome>
where
    I: IntoIterator<Item = String>,
{
    statuses
        .into_iter()
        .filter_map(|raw| match raw.parse::<SubmissionStatus>() {
            Ok(status) => Some(SubmissionOutcome { status }),
            Err(err) => {
                warn!(%learner_id, %err, "skipping submission");
                None
            }
        })
        .collect()
}

fn learner_from_row(row: &sqlx::postgres::PgRow) -> Learner {
    Learner {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
    }
}

pub async fn find_learner_by_id(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Learner>> {
    let row = sqlx::query("SELECT id, full_name, email FROM learner_insight.learners WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(learner_from_row))
}

pub async fn find_learner_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<Learner>> {
    let row =
        sqlx::query("SELECT id, full_name, email FROM learner_insight.learners WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;
    Ok(row.as_ref().map(learner_from_row))
}

async fn upsert_learner(pool: &PgPool, id: Uuid, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let learner_id: Uuid = sqlx::query(
        r#"
        INSERT INTO learner_insight.learners (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(learner_id)
}

async fn insert_activity(
    pool: &PgPool,
    learner_id: Uuid,
    module_key: &str,
    first_opened_at: Option<DateTime<Utc>>,
    last_viewed: Option<DateTime<Utc>>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO learner_insight.module_activity
        (id, learner_id, module_key, first_opened_at, last_viewed, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(learner_id)
    .bind(module_key)
    .bind(first_opened_at)
    .bind(last_viewed)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .context("invalid timestamp")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let avery = upsert_learner(
        pool,
        Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
        "Avery Lee",
        "avery.lee@example.edu",
    )
    .await?;
    let jules = upsert_learner(
        pool,
        Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
        "Jules Moreno",
        "jules.moreno@example.edu",
    )
    .await?;

    // Avery studies late and across midnight; Jules keeps a morning routine.
    let activity = vec![
        ("seed-act-001", avery, "rust-101/ownership", ts(2026, 2, 2, 22, 40)?, Some(ts(2026, 2, 2, 23, 30)?)),
        ("seed-act-002", avery, "rust-101/borrowing", ts(2026, 2, 3, 23, 50)?, Some(ts(2026, 2, 4, 0, 45)?)),
        ("seed-act-003", avery, "rust-101/lifetimes", ts(2026, 2, 10, 0, 20)?, Some(ts(2026, 2, 10, 1, 10)?)),
        ("seed-act-004", avery, "rust-101/traits", ts(2026, 2, 11, 23, 5)?, None),
        ("seed-act-005", jules, "sql-basics/select", ts(2026, 2, 2, 8, 30)?, Some(ts(2026, 2, 2, 9, 15)?)),
        ("seed-act-006", jules, "sql-basics/joins", ts(2026, 2, 3, 8, 45)?, Some(ts(2026, 2, 3, 9, 40)?)),
        ("seed-act-007", jules, "sql-basics/indexes", ts(2026, 2, 4, 9, 30)?, Some(ts(2026, 2, 4, 10, 5)?)),
    ];

    for (source_key, learner_id, module_key, opened, viewed) in activity {
        insert_activity(pool, learner_id, module_key, Some(opened), viewed, source_key).await?;
    }

    let exams = vec![
        ("seed-exam-001", avery, "rust-101/quiz-1", 72.0_f64),
        ("seed-exam-002", avery, "rust-101/quiz-2", 65.0),
        ("seed-exam-003", jules, "sql-basics/quiz-1", 80.0),
        ("seed-exam-004", jules, "sql-basics/quiz-2", 90.0),
    ];

    for (source_key, learner_id, exam_key, score) in exams {
        sqlx::query(
            r#"
            INSERT INTO learner_insight.exam_scores (id, learner_id, exam_key, score, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(exam_key)
        .bind(score)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let submissions = vec![
        ("seed-sub-001", avery, "rust-101/project", SubmissionStatus::Failed),
        ("seed-sub-002", avery, "rust-101/project", SubmissionStatus::Rejected),
        ("seed-sub-003", avery, "rust-101/project", SubmissionStatus::Passed),
        ("seed-sub-004", jules, "sql-basics/project", SubmissionStatus::Passed),
    ];

    for (source_key, learner_id, module_key, status) in submissions {
        sqlx::query(
            r#"
            INSERT INTO learner_insight.submissions (id, learner_id, module_key, status, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(module_key)
        .bind(status.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let enrollments = vec![
        ("seed-enr-001", avery, "rust-101", "completed", ts(2026, 2, 1, 20, 0)?, Some(ts(2026, 2, 3, 2, 0)?)),
        ("seed-enr-002", avery, "async-201", "active", ts(2026, 2, 12, 22, 0)?, None),
        ("seed-enr-003", jules, "sql-basics", "completed", ts(2026, 2, 2, 8, 0)?, Some(ts(2026, 2, 2, 23, 0)?)),
    ];

    for (source_key, learner_id, course_key, status, enrolled_at, last_accessed_at) in enrollments {
        sqlx::query(
            r#"
            INSERT INTO learner_insight.enrollments
            (id, learner_id, course_key, status, enrolled_at, last_accessed_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(course_key)
        .bind(status)
        .bind(enrolled_at)
        .bind(last_accessed_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    info!("seeded demo learners");
    Ok(())
}

/// Imports module activity rows. Timestamps are RFC 3339; empty cells are
/// stored as NULL.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        module_key: String,
        first_opened_at: Option<DateTime<Utc>>,
        last_viewed: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {} in {}", line + 1, csv_path.display()))?;
        let learner_id = upsert_learner(pool, Uuid::new_v4(), &row.full_name, &row.email).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_activity(
            pool,
            learner_id,
            &row.module_key,
            row.first_opened_at,
            row.last_viewed,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "activity import finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::submission_fail_rate;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_store(query_timeout: Duration) -> PgStore {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/learner_insight_unused")
            .unwrap();
        PgStore::new(pool, query_timeout)
    }

    #[tokio::test]
    async fn slow_query_fails_with_timeout() {
        let timeout = Duration::from_millis(20);
        let store = lazy_store(timeout);

        let result: Result<(), StoreError> = store
            .timed("activity_events", std::future::pending())
            .await;

        match result {
            Err(StoreError::Timeout { query, timeout: waited }) => {
                assert_eq!(query, "activity_events");
                assert_eq!(waited, timeout);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finished_query_passes_through() {
        let store = lazy_store(Duration::from_secs(1));
        let result = store.timed("exam_scores", async { Ok(7) }).await;
        assert!(matches!(result, Ok(7)));
    }

    #[test]
    fn unknown_statuses_leave_fail_rate_untouched() {
        let statuses = ["failed", " Passed", "retry", "rejected"]
            .into_iter()
            .map(String::from);
        let outcomes = parse_outcomes(Uuid::new_v4(), statuses);

        assert_eq!(outcomes.len(), 3);
        assert!((submission_fail_rate(&outcomes) - 1.0 / 3.0).abs() < 1e-12);
    }
}
