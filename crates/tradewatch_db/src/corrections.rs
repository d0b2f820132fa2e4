//! Data quality correction audit trail.

use crate::error::Result;
use crate::types::NewCorrection;
use crate::TradewatchDb;
use chrono::Utc;
use sqlx::Row;

impl TradewatchDb {
    /// Record an automated correction. Every edit the normalizer or the
    /// ticker auto-corrector makes lands here with old/new values.
    pub async fn insert_correction(&self, correction: &NewCorrection) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO data_quality_corrections (
                id, table_name, record_id, field_name, correction_type,
                old_value, new_value, confidence, corrected_by, status,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&correction.table_name)
        .bind(&correction.record_id)
        .bind(&correction.field_name)
        .bind(&correction.correction_type)
        .bind(&correction.old_value)
        .bind(&correction.new_value)
        .bind(correction.confidence)
        .bind(&correction.corrected_by)
        .bind(&correction.status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Corrections recorded for one record (inspection and tests).
    pub async fn corrections_for_record(
        &self,
        table_name: &str,
        record_id: &str,
    ) -> Result<Vec<NewCorrection>> {
        let rows = sqlx::query(
            "SELECT * FROM data_quality_corrections
             WHERE table_name = ? AND record_id = ?
             ORDER BY created_at ASC",
        )
        .bind(table_name)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| NewCorrection {
                table_name: row.get("table_name"),
                record_id: row.get("record_id"),
                field_name: row.get("field_name"),
                correction_type: row.get("correction_type"),
                old_value: row.get("old_value"),
                new_value: row.get("new_value"),
                confidence: row.get("confidence"),
                corrected_by: row.get("corrected_by"),
                status: row.get("status"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_correction_audit_roundtrip() {
        let db = TradewatchDb::in_memory().await.unwrap();

        db.insert_correction(&NewCorrection {
            table_name: "trading_disclosures".to_string(),
            record_id: "d1".to_string(),
            field_name: "asset_ticker".to_string(),
            correction_type: "ticker_cleanup".to_string(),
            old_value: Some("FB".to_string()),
            new_value: Some("META".to_string()),
            confidence: 1.0,
            corrected_by: "auto_corrector".to_string(),
            status: "applied".to_string(),
        })
        .await
        .unwrap();

        let audit = db
            .corrections_for_record("trading_disclosures", "d1")
            .await
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].old_value.as_deref(), Some("FB"));
        assert_eq!(audit[0].new_value.as_deref(), Some("META"));
        assert!((audit[0].confidence - 1.0).abs() < f64::EPSILON);
    }
}
