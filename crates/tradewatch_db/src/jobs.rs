//! Scheduled-job definition operations.
//!
//! The scheduled_jobs table is the single source of truth for schedules.
//! The in-memory scheduler is a cache rebuilt from it on startup.

use crate::error::Result;
use crate::types::{JobDefinition, ScheduleType};
use crate::{DbError, DbRow, TradewatchDb};
use chrono::{DateTime, Utc};
use sqlx::Row;

impl TradewatchDb {
    /// Register (or refresh) a durable job definition.
    pub async fn upsert_job_definition(&self, job: &JobDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (
                job_id, job_name, job_function, schedule_type, schedule_value,
                enabled, last_run_at, next_scheduled_run, consecutive_failures,
                max_consecutive_failures, auto_retry_on_startup, metadata,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                job_name = excluded.job_name,
                job_function = excluded.job_function,
                schedule_type = excluded.schedule_type,
                schedule_value = excluded.schedule_value,
                enabled = excluded.enabled,
                next_scheduled_run = excluded.next_scheduled_run,
                max_consecutive_failures = excluded.max_consecutive_failures,
                auto_retry_on_startup = excluded.auto_retry_on_startup,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.job_name)
        .bind(&job.job_function)
        .bind(job.schedule_type.as_str())
        .bind(&job.schedule_value)
        .bind(job.enabled)
        .bind(job.last_run_at)
        .bind(job.next_scheduled_run)
        .bind(job.consecutive_failures)
        .bind(job.max_consecutive_failures)
        .bind(job.auto_retry_on_startup)
        .bind(serde_json::to_string(&job.metadata)?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every enabled job definition (scheduler startup load).
    pub async fn enabled_jobs(&self) -> Result<Vec<JobDefinition>> {
        let rows = sqlx::query("SELECT * FROM scheduled_jobs WHERE enabled = 1 ORDER BY job_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_job_definition).collect()
    }

    /// Jobs due for missed-job recovery: enabled, flagged for startup
    /// retry, overdue, and under the failure ceiling.
    pub async fn overdue_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduled_jobs
            WHERE enabled = 1
              AND auto_retry_on_startup = 1
              AND next_scheduled_run IS NOT NULL
              AND next_scheduled_run <= ?
              AND consecutive_failures < max_consecutive_failures
            ORDER BY next_scheduled_run ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job_definition).collect()
    }

    /// Bookkeeping after a run: bumps `last_run_at`, resets or increments
    /// `consecutive_failures`, and schedules the next run.
    pub async fn update_job_after_execution(
        &self,
        job_id: &str,
        success: bool,
        next_scheduled_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if success {
            sqlx::query(
                "UPDATE scheduled_jobs
                 SET last_run_at = ?, consecutive_failures = 0,
                     next_scheduled_run = ?, updated_at = ?
                 WHERE job_id = ?",
            )
            .bind(Utc::now())
            .bind(next_scheduled_run)
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE scheduled_jobs
                 SET last_run_at = ?, consecutive_failures = consecutive_failures + 1,
                     next_scheduled_run = ?, updated_at = ?
                 WHERE job_id = ?",
            )
            .bind(Utc::now())
            .bind(next_scheduled_run)
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn get_job_definition(&self, job_id: &str) -> Result<JobDefinition> {
        let row = sqlx::query("SELECT * FROM scheduled_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => row_to_job_definition(&r),
            None => Err(DbError::not_found(format!("scheduled job {job_id}"))),
        }
    }

    pub async fn set_job_enabled(&self, job_id: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET enabled = ?, updated_at = ? WHERE job_id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_job_definition(&self, job_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn row_to_job_definition(row: &DbRow) -> Result<JobDefinition> {
    let schedule_str: String = row.get("schedule_type");
    let schedule_type = ScheduleType::parse(&schedule_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown schedule type: {schedule_str}")))?;

    let metadata_text: String = row.get("metadata");
    let metadata = serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null);

    Ok(JobDefinition {
        job_id: row.get("job_id"),
        job_name: row.get("job_name"),
        job_function: row.get("job_function"),
        schedule_type,
        schedule_value: row.get("schedule_value"),
        enabled: row.get::<i64, _>("enabled") != 0,
        last_run_at: row.get("last_run_at"),
        next_scheduled_run: row.get("next_scheduled_run"),
        consecutive_failures: row.get("consecutive_failures"),
        max_consecutive_failures: row.get("max_consecutive_failures"),
        auto_retry_on_startup: row.get::<i64, _>("auto_retry_on_startup") != 0,
        metadata,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_job(job_id: &str, next_run: Option<DateTime<Utc>>) -> JobDefinition {
        let now = Utc::now();
        JobDefinition {
            job_id: job_id.to_string(),
            job_name: format!("Job {job_id}"),
            job_function: "daily_etl".to_string(),
            schedule_type: ScheduleType::Cron,
            schedule_value: "0 2 * * *".to_string(),
            enabled: true,
            last_run_at: None,
            next_scheduled_run: next_run,
            consecutive_failures: 0,
            max_consecutive_failures: 3,
            auto_retry_on_startup: true,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let db = TradewatchDb::in_memory().await.unwrap();

        db.upsert_job_definition(&sample_job("daily_etl", None)).await.unwrap();
        let mut replacement = sample_job("daily_etl", None);
        replacement.schedule_value = "0 4 * * *".to_string();
        db.upsert_job_definition(&replacement).await.unwrap();

        let jobs = db.enabled_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].schedule_value, "0 4 * * *");
    }

    #[tokio::test]
    async fn test_overdue_query_filters() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let now = Utc::now();

        // Overdue and eligible.
        db.upsert_job_definition(&sample_job("overdue", Some(now - Duration::hours(7))))
            .await
            .unwrap();
        // Not yet due.
        db.upsert_job_definition(&sample_job("future", Some(now + Duration::hours(1))))
            .await
            .unwrap();
        // Overdue but over the failure ceiling.
        let mut broken = sample_job("broken", Some(now - Duration::hours(7)));
        broken.consecutive_failures = 3;
        db.upsert_job_definition(&broken).await.unwrap();

        let overdue = db.overdue_jobs(now).await.unwrap();
        let ids: Vec<_> = overdue.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["overdue"]);
    }

    #[tokio::test]
    async fn test_execution_bookkeeping() {
        let db = TradewatchDb::in_memory().await.unwrap();
        let now = Utc::now();
        db.upsert_job_definition(&sample_job("etl", Some(now))).await.unwrap();

        db.update_job_after_execution("etl", false, Some(now)).await.unwrap();
        db.update_job_after_execution("etl", false, Some(now)).await.unwrap();
        assert_eq!(db.get_job_definition("etl").await.unwrap().consecutive_failures, 2);

        let next = now + Duration::days(1);
        db.update_job_after_execution("etl", true, Some(next)).await.unwrap();
        let job = db.get_job_definition("etl").await.unwrap();
        assert_eq!(job.consecutive_failures, 0);
        assert!(job.last_run_at.is_some());
        assert_eq!(
            job.next_scheduled_run.map(|t| t.timestamp()),
            Some(next.timestamp())
        );
    }
}
