//! Trading disclosure table operations.

use crate::error::{DbError, Result};
use crate::types::{DisclosureRow, DisclosureUpdate, NewDisclosure};
use crate::{DbRow, TradewatchDb};
use chrono::{NaiveDate, Utc};
use sqlx::Row;

/// Result of a batch insert. Per-row results keep input order so callers
/// can report each record: `Some(id)` landed, `None` collided with the
/// unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInsertOutcome {
    pub row_ids: Vec<Option<String>>,
}

impl BatchInsertOutcome {
    pub fn inserted(&self) -> u64 {
        self.row_ids.iter().filter(|id| id.is_some()).count() as u64
    }

    pub fn skipped(&self) -> u64 {
        self.row_ids.iter().filter(|id| id.is_none()).count() as u64
    }
}

impl TradewatchDb {
    /// Look up an existing disclosure by the duplicate-check key.
    ///
    /// Note this is the four-field check the publisher uses before insert;
    /// the unique index adds `disclosure_date` as the fifth column.
    pub async fn find_disclosure(
        &self,
        politician_id: &str,
        transaction_date: NaiveDate,
        asset_name: &str,
        transaction_type: &str,
    ) -> Result<Option<DisclosureRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM trading_disclosures
            WHERE politician_id = ?
              AND transaction_date = ?
              AND asset_name = ?
              AND transaction_type = ?
            LIMIT 1
            "#,
        )
        .bind(politician_id)
        .bind(transaction_date)
        .bind(asset_name)
        .bind(transaction_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_disclosure(&r)).transpose()
    }

    /// Insert a new disclosure with status `active`. Unique-key collisions
    /// surface as `DbError` with `is_unique_violation() == true`.
    pub async fn insert_disclosure(&self, new: &NewDisclosure) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO trading_disclosures (
                id, politician_id, transaction_date, disclosure_date,
                transaction_type, asset_name, asset_ticker, asset_type,
                amount_range_min, amount_range_max, amount_exact,
                source, source_url, source_document_id, raw_data, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.politician_id)
        .bind(new.transaction_date)
        .bind(new.disclosure_date)
        .bind(&new.transaction_type)
        .bind(&new.asset_name)
        .bind(&new.asset_ticker)
        .bind(&new.asset_type)
        .bind(new.amount_range_min)
        .bind(new.amount_range_max)
        .bind(new.amount_exact)
        .bind(&new.source)
        .bind(&new.source_url)
        .bind(&new.source_document_id)
        .bind(serde_json::to_string(&new.raw_data)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Update the mutable fields of an existing disclosure.
    ///
    /// The field list is deliberate: key columns (politician, dates, asset
    /// name, transaction type) are never rewritten.
    pub async fn update_disclosure(&self, id: &str, update: &DisclosureUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trading_disclosures SET
                asset_ticker = ?,
                asset_type = ?,
                amount_range_min = ?,
                amount_range_max = ?,
                amount_exact = ?,
                source_url = ?,
                raw_data = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.asset_ticker)
        .bind(&update.asset_type)
        .bind(update.amount_range_min)
        .bind(update.amount_range_max)
        .bind(update.amount_exact)
        .bind(&update.source_url)
        .bind(serde_json::to_string(&update.raw_data)?)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Link a stored raw PDF to its disclosure row.
    pub async fn set_disclosure_source_file(&self, disclosure_id: &str, file_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE trading_disclosures
             SET source_file_id = ?, has_raw_pdf = 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(file_id)
        .bind(Utc::now())
        .bind(disclosure_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flag that parsed intermediate data exists for a disclosure.
    pub async fn set_disclosure_parsed_data(&self, disclosure_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE trading_disclosures SET has_parsed_data = 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(disclosure_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Disclosures carrying a given ticker (ticker auto-correction scan).
    pub async fn disclosures_with_ticker(&self, ticker: &str) -> Result<Vec<DisclosureRow>> {
        let rows = sqlx::query("SELECT * FROM trading_disclosures WHERE asset_ticker = ?")
            .bind(ticker)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_disclosure).collect()
    }

    /// Rewrite a disclosure's ticker (auto-correction apply path).
    pub async fn update_disclosure_ticker(&self, id: &str, ticker: &str) -> Result<()> {
        sqlx::query(
            "UPDATE trading_disclosures SET asset_ticker = ?, updated_at = ? WHERE id = ?",
        )
        .bind(ticker)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a batch of disclosures in one transaction.
    ///
    /// On a duplicate-key error anywhere in the batch, the transaction is
    /// rolled back and rows are inserted one by one, reporting collisions
    /// as skips. Any non-duplicate error fails the whole batch.
    pub async fn insert_disclosures_batch(
        &self,
        batch: &[NewDisclosure],
    ) -> Result<BatchInsertOutcome> {
        let ids: Vec<String> = batch
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let mut tx = self.pool.begin().await?;
        let mut hit_duplicate = false;

        for (new, id) in batch.iter().zip(&ids) {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO trading_disclosures (
                    id, politician_id, transaction_date, disclosure_date,
                    transaction_type, asset_name, asset_ticker, asset_type,
                    amount_range_min, amount_range_max, amount_exact,
                    source, source_url, source_document_id, raw_data, status,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
                "#,
            )
            .bind(id)
            .bind(&new.politician_id)
            .bind(new.transaction_date)
            .bind(new.disclosure_date)
            .bind(&new.transaction_type)
            .bind(&new.asset_name)
            .bind(&new.asset_ticker)
            .bind(&new.asset_type)
            .bind(new.amount_range_min)
            .bind(new.amount_range_max)
            .bind(new.amount_exact)
            .bind(&new.source)
            .bind(&new.source_url)
            .bind(&new.source_document_id)
            .bind(serde_json::to_string(&new.raw_data)?)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(e) => {
                    let db_err = DbError::from(e);
                    if db_err.is_unique_violation() {
                        hit_duplicate = true;
                        break;
                    }
                    tx.rollback().await?;
                    return Err(db_err);
                }
            }
        }

        if !hit_duplicate {
            tx.commit().await?;
            return Ok(BatchInsertOutcome {
                row_ids: ids.into_iter().map(Some).collect(),
            });
        }

        // Duplicate somewhere in the batch: redo row by row.
        tx.rollback().await?;
        let mut row_ids = Vec::with_capacity(batch.len());
        for new in batch {
            match self.insert_disclosure(new).await {
                Ok(id) => row_ids.push(Some(id)),
                Err(e) if e.is_unique_violation() => row_ids.push(None),
                Err(e) => return Err(e),
            }
        }

        Ok(BatchInsertOutcome { row_ids })
    }

    /// Count all disclosures (run summaries and tests).
    pub async fn count_disclosures(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trading_disclosures")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }
}

pub(crate) fn row_to_disclosure(row: &DbRow) -> Result<DisclosureRow> {
    let raw_text: String = row.get("raw_data");
    let raw_data = serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null);

    Ok(DisclosureRow {
        id: row.get("id"),
        politician_id: row.get("politician_id"),
        transaction_date: row.get("transaction_date"),
        disclosure_date: row.get("disclosure_date"),
        transaction_type: row.get("transaction_type"),
        asset_name: row.get("asset_name"),
        asset_ticker: row.get("asset_ticker"),
        asset_type: row.get("asset_type"),
        amount_range_min: row.get("amount_range_min"),
        amount_range_max: row.get("amount_range_max"),
        amount_exact: row.get("amount_exact"),
        source: row.get("source"),
        source_url: row.get("source_url"),
        source_document_id: row.get("source_document_id"),
        raw_data,
        status: row.get("status"),
        has_raw_pdf: row.get::<i64, _>("has_raw_pdf") != 0,
        has_parsed_data: row.get::<i64, _>("has_parsed_data") != 0,
        source_file_id: row.get("source_file_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
