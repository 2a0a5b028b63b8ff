//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `mod.rs` - Client and commission settings operations
//! - `deals.rs` - Deal reads, compare-and-swap writes and stage history

mod deals;

pub use deals::SnapshotWrite;

use crate::domain::{AgentId, Client, ClientId, CommissionSettings, CommissionType, Decimal, TimeMs};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Round-trip a trivial query to confirm the database is reachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Client operations
    // =========================================================================

    /// Insert a new client without commission settings.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate client code).
    pub async fn insert_client(&self, client: &Client) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, client_code, name, email, assigned_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(client.id.as_str())
        .bind(&client.client_code)
        .bind(&client.name)
        .bind(client.email.as_deref())
        .bind(client.assigned_agent.as_str())
        .bind(client.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a client and its commission settings.
    pub async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, client_code, name, email, assigned_agent, created_at,
                   engagement_type, commission_type, rate_pct, fixed_fee, currency,
                   settings_updated_at
            FROM clients
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Client {
                id: ClientId::new(r.get::<String, _>("id")),
                client_code: r.get("client_code"),
                name: r.get("name"),
                email: r.get("email"),
                assigned_agent: AgentId::new(r.get::<String, _>("assigned_agent")),
                commission_settings: settings_from_row(&r)?,
                created_at: TimeMs::new(r.get("created_at")),
            })
        })
        .transpose()
    }

    /// Commission settings of a client. `None` if the client is unknown or has
    /// never saved settings.
    pub async fn get_commission_settings(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<CommissionSettings>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT engagement_type, commission_type, rate_pct, fixed_fee, currency,
                   settings_updated_at
            FROM clients
            WHERE id = ?
            "#,
        )
        .bind(client_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => settings_from_row(&r),
            None => Ok(None),
        }
    }

    /// Replace a client's commission settings.
    ///
    /// Returns false if the client does not exist.
    pub async fn save_commission_settings(
        &self,
        client_id: &ClientId,
        settings: &CommissionSettings,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET engagement_type = ?, commission_type = ?, rate_pct = ?, fixed_fee = ?,
                currency = ?, settings_updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(settings.engagement_type.as_str())
        .bind(settings.commission_type.as_str())
        .bind(settings.rate_pct.map(|d| d.to_canonical_string()))
        .bind(settings.fixed_fee.map(|d| d.to_canonical_string()))
        .bind(&settings.currency)
        .bind(settings.updated_at.as_ms())
        .bind(client_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Decode the commission settings columns of a `clients` row.
fn settings_from_row(row: &SqliteRow) -> Result<Option<CommissionSettings>, sqlx::Error> {
    let Some(commission_type) = row.get::<Option<String>, _>("commission_type") else {
        return Ok(None);
    };
    let engagement_type: String = row.try_get("engagement_type")?;

    Ok(Some(CommissionSettings {
        engagement_type: parse_column(&engagement_type)?,
        commission_type: parse_column::<CommissionType>(&commission_type)?,
        rate_pct: decimal_column(row, "rate_pct"),
        fixed_fee: decimal_column(row, "fixed_fee"),
        currency: row
            .get::<Option<String>, _>("currency")
            .unwrap_or_else(|| crate::domain::DEFAULT_CURRENCY.to_string()),
        updated_at: TimeMs::new(row.get::<Option<i64>, _>("settings_updated_at").unwrap_or(0)),
    }))
}

/// Parse an enum stored as text; unknown values are a decode error.
pub(crate) fn parse_column<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    T::from_str(raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Read an optional decimal column stored as a canonical string.
///
/// Unparseable values are logged and treated as absent.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Option<Decimal> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| match Decimal::from_str(&s) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(column, value = %s, error = %e, "Failed to parse stored decimal, treating as absent");
            None
        }
    })
}
