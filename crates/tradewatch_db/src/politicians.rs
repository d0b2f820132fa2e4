//! Politician table operations.

use crate::error::Result;
use crate::types::{none_if_blank, Politician};
use crate::{DbRow, TradewatchDb};
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

impl TradewatchDb {
    /// Insert a new politician row.
    pub async fn insert_politician(&self, politician: &Politician) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO politicians (
                id, first_name, last_name, full_name, role, party,
                state_or_country, district, chamber, bioguide_id, source,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&politician.id)
        .bind(&politician.first_name)
        .bind(&politician.last_name)
        .bind(&politician.full_name)
        .bind(&politician.role)
        .bind(&politician.party)
        .bind(&politician.state_or_country)
        .bind(&politician.district)
        .bind(&politician.chamber)
        .bind(&politician.bioguide_id)
        .bind(&politician.source)
        .bind(politician.created_at)
        .bind(politician.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(politician.id.clone())
    }

    /// Find a politician by normalized name, optionally narrowed by role.
    pub async fn find_politician_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        role: Option<&str>,
    ) -> Result<Option<Politician>> {
        let row = match role {
            Some(role) => {
                sqlx::query(
                    r#"
                    SELECT * FROM politicians
                    WHERE lower(first_name) = lower(?)
                      AND lower(last_name) = lower(?)
                      AND role = ?
                    LIMIT 1
                    "#,
                )
                .bind(first_name)
                .bind(last_name)
                .bind(role)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM politicians
                    WHERE lower(first_name) = lower(?)
                      AND lower(last_name) = lower(?)
                    LIMIT 1
                    "#,
                )
                .bind(first_name)
                .bind(last_name)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|r| row_to_politician(&r)).transpose()
    }

    /// Find a politician by bioguide id.
    pub async fn find_politician_by_bioguide(
        &self,
        bioguide_id: &str,
    ) -> Result<Option<Politician>> {
        let row = sqlx::query("SELECT * FROM politicians WHERE bioguide_id = ? LIMIT 1")
            .bind(bioguide_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_politician(&r)).transpose()
    }

    /// Load every politician (the matcher cache builds from this).
    pub async fn list_politicians(&self) -> Result<Vec<Politician>> {
        let rows = sqlx::query("SELECT * FROM politicians ORDER BY last_name, first_name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_politician).collect()
    }

    /// Upsert: bioguide id wins when present, then normalized name key.
    /// Returns `(id, created)`.
    pub async fn upsert_politician(&self, politician: &Politician) -> Result<(String, bool)> {
        if let Some(bioguide) = &politician.bioguide_id {
            if let Some(existing) = self.find_politician_by_bioguide(bioguide).await? {
                self.touch_politician(&existing.id).await?;
                return Ok((existing.id, false));
            }
        }

        if let Some(existing) = self
            .find_politician_by_name(
                &politician.first_name,
                &politician.last_name,
                Some(&politician.role),
            )
            .await?
        {
            self.touch_politician(&existing.id).await?;
            return Ok((existing.id, false));
        }

        let id = self.insert_politician(politician).await?;
        debug!(politician = %politician.full_name, %id, "Created politician");
        Ok((id, true))
    }

    /// Rewrite a politician's role (normalizer batch job).
    pub async fn update_politician_role(&self, id: &str, role: &str) -> Result<()> {
        sqlx::query("UPDATE politicians SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rewrite a politician's name fields (normalizer batch job).
    pub async fn update_politician_name(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
        full_name: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE politicians SET first_name = ?, last_name = ?, full_name = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(full_name)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Backfill state_or_country (normalizer batch job).
    pub async fn update_politician_state(&self, id: &str, state: &str) -> Result<()> {
        sqlx::query("UPDATE politicians SET state_or_country = ?, updated_at = ? WHERE id = ?")
            .bind(state)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_politician(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE politicians SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(crate) fn row_to_politician(row: &DbRow) -> Result<Politician> {
    Ok(Politician {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        full_name: row.get("full_name"),
        role: row.get("role"),
        party: none_if_blank(row.get("party")),
        state_or_country: none_if_blank(row.get("state_or_country")),
        district: none_if_blank(row.get("district")),
        chamber: none_if_blank(row.get("chamber")),
        bioguide_id: none_if_blank(row.get("bioguide_id")),
        source: row.get("source"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
