//! Job execution history operations.

use crate::error::Result;
use crate::types::{ExecutionStatus, JobExecution};
use crate::{DbError, DbRow, TradewatchDb};
use chrono::Utc;
use sqlx::Row;

impl TradewatchDb {
    /// Open an execution row as `running`. Returns its id.
    pub async fn start_execution(&self, job_id: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO job_executions (id, job_id, status, started_at, logs, metadata)
            VALUES (?, ?, 'running', ?, '', '{}')
            "#,
        )
        .bind(&id)
        .bind(job_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Close an execution with its final status, duration, and captured logs.
    pub async fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        duration_seconds: f64,
        error_message: Option<&str>,
        logs: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions SET
                status = ?,
                completed_at = ?,
                duration_seconds = ?,
                error_message = ?,
                logs = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(duration_seconds)
        .bind(error_message)
        .bind(logs.join("\n"))
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent executions, newest first (history cache seed).
    pub async fn recent_executions(&self, limit: i64) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM job_executions ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_execution).collect()
    }

    /// Execution history for one job, newest first.
    pub async fn executions_for_job(&self, job_id: &str, limit: i64) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM job_executions WHERE job_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_execution).collect()
    }
}

pub(crate) fn row_to_execution(row: &DbRow) -> Result<JobExecution> {
    let status_str: String = row.get("status");
    let status = ExecutionStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown execution status: {status_str}")))?;

    let metadata_text: String = row.get("metadata");
    let metadata = serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null);

    Ok(JobExecution {
        id: row.get("id"),
        job_id: row.get("job_id"),
        status,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        duration_seconds: row.get("duration_seconds"),
        error_message: row.get("error_message"),
        logs: row.get("logs"),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let db = TradewatchDb::in_memory().await.unwrap();

        let id = db.start_execution("daily_etl").await.unwrap();
        db.finish_execution(
            &id,
            ExecutionStatus::Success,
            2.5,
            None,
            &["starting".to_string(), "done".to_string()],
        )
        .await
        .unwrap();

        let history = db.executions_for_job("daily_etl", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        let exec = &history[0];
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.logs, "starting\ndone");
        assert!(exec.completed_at.is_some());
        assert!((exec.duration_seconds.unwrap() - 2.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_execution_records_error() {
        let db = TradewatchDb::in_memory().await.unwrap();

        let id = db.start_execution("daily_etl").await.unwrap();
        db.finish_execution(&id, ExecutionStatus::Failed, 0.1, Some("source blocked"), &[])
            .await
            .unwrap();

        let history = db.recent_executions(10).await.unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert_eq!(history[0].error_message.as_deref(), Some("source blocked"));
    }
}
