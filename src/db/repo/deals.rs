//! Deal operations for the repository.
//!
//! Every write that touches `stage` or `commission_computed` is conditional on
//! the `version` read by the caller and bumps it, so concurrent writers to one
//! deal detect each other instead of losing updates.

use crate::domain::{
    AgentId, ClientId, CommissionComputed, Deal, DealId, Offer, OfferStatus, Stage, StageChange,
    TimeMs,
};
use futures::stream::{self, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{decimal_column, parse_column, Repository};

const DEAL_COLUMNS: &str = r#"
    id, client_id, assigned_agent, name, property_address, deal_type, stage,
    stage_updated_at, offer_number, offer_amount, offer_status, offer_date,
    offer_expiry, offer_proof_of_funds, offer_conditions, commission_computed,
    version, created_at
"#;

/// Concurrent writes issued by one bulk snapshot update.
const BULK_WRITE_CONCURRENCY: usize = 4;

/// One conditional snapshot write in a bulk update.
#[derive(Debug, Clone)]
pub struct SnapshotWrite {
    pub deal_id: DealId,
    pub expected_version: i64,
    pub snapshot: Option<CommissionComputed>,
}

impl Repository {
    /// Insert a new deal.
    ///
    /// # Errors
    /// Returns an error if the insert fails (e.g. unknown client).
    pub async fn insert_deal(&self, deal: &Deal) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO deals (
                id, client_id, assigned_agent, name, property_address, deal_type, stage,
                stage_updated_at, offer_number, offer_amount, offer_status, offer_date,
                offer_expiry, offer_proof_of_funds, offer_conditions, commission_computed,
                version, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(deal.id.as_str())
        .bind(deal.client_id.as_str())
        .bind(deal.assigned_agent.as_str())
        .bind(&deal.name)
        .bind(deal.property_address.as_deref())
        .bind(deal.deal_type.as_str())
        .bind(deal.stage.as_str())
        .bind(deal.stage_updated_at.as_ms())
        .bind(&deal.offer.offer_number)
        .bind(deal.offer.amount.map(|d| d.to_canonical_string()))
        .bind(deal.offer.status.as_str())
        .bind(deal.offer.date.map(|t| t.as_ms()))
        .bind(deal.offer.expiry_date.map(|t| t.as_ms()))
        .bind(deal.offer.proof_of_funds_attached)
        .bind(deal.offer.conditions.as_deref())
        .bind(encode_snapshot(deal.commission_computed.as_ref())?)
        .bind(deal.version)
        .bind(deal.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a deal by id.
    pub async fn get_deal(&self, id: &DealId) -> Result<Option<Deal>, sqlx::Error> {
        let sql = format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(deal_from_row).transpose()
    }

    /// Deals of one client owned by `agent`, newest first.
    pub async fn list_deals_for_client(
        &self,
        client_id: &ClientId,
        agent: &AgentId,
    ) -> Result<Vec<Deal>, sqlx::Error> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE client_id = ? AND assigned_agent = ? \
             ORDER BY created_at DESC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(client_id.as_str())
            .bind(agent.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(deal_from_row).collect()
    }

    /// Deals of `agent` (optionally one client) currently at `stage` whose
    /// stage was entered at or after `since`.
    pub async fn query_deals_at_stage(
        &self,
        agent: &AgentId,
        client_id: Option<&ClientId>,
        stage: Stage,
        since: TimeMs,
    ) -> Result<Vec<Deal>, sqlx::Error> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM deals \
             WHERE assigned_agent = ? AND stage = ? AND stage_updated_at >= ? \
             AND (? IS NULL OR client_id = ?) \
             ORDER BY stage_updated_at ASC, id ASC"
        );
        let client = client_id.map(|c| c.as_str());
        let rows = sqlx::query(&sql)
            .bind(agent.as_str())
            .bind(stage.as_str())
            .bind(since.as_ms())
            .bind(client)
            .bind(client)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(deal_from_row).collect()
    }

    /// Deals of a client whose offer is accepted with a positive amount.
    ///
    /// The amount filter runs on decoded decimals rather than in SQL, since the
    /// amounts are stored as text.
    pub async fn query_commissionable_deals(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<Deal>, sqlx::Error> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE client_id = ? AND offer_status = ? \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(client_id.as_str())
            .bind(OfferStatus::Accepted.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut deals = Vec::with_capacity(rows.len());
        for row in &rows {
            let deal = deal_from_row(row)?;
            if deal.offer.commissionable_amount().is_some() {
                deals.push(deal);
            }
        }
        Ok(deals)
    }

    /// Delete a deal. Its cached commission and stage history go with it.
    pub async fn delete_deal(&self, id: &DealId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM deals WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the offer and clear the cached commission in one write.
    ///
    /// Returns false if `expected_version` no longer matches.
    pub async fn update_offer_cas(
        &self,
        id: &DealId,
        expected_version: i64,
        offer: &Offer,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE deals
            SET offer_amount = ?, offer_status = ?, offer_date = ?, offer_expiry = ?,
                offer_proof_of_funds = ?, offer_conditions = ?,
                commission_computed = NULL, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(offer.amount.map(|d| d.to_canonical_string()))
        .bind(offer.status.as_str())
        .bind(offer.date.map(|t| t.as_ms()))
        .bind(offer.expiry_date.map(|t| t.as_ms()))
        .bind(offer.proof_of_funds_attached)
        .bind(offer.conditions.as_deref())
        .bind(id.as_str())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store (or clear, with `None`) the cached commission of a deal.
    ///
    /// Returns false if `expected_version` no longer matches.
    pub async fn store_commission_cas(
        &self,
        id: &DealId,
        expected_version: i64,
        snapshot: Option<&CommissionComputed>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE deals
            SET commission_computed = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(encode_snapshot(snapshot)?)
        .bind(id.as_str())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply many snapshot writes independently.
    ///
    /// Results line up with `writes`; one failing write does not stop the rest.
    pub async fn store_commissions_bulk(
        &self,
        writes: &[SnapshotWrite],
    ) -> Vec<Result<bool, sqlx::Error>> {
        let pending: Vec<_> = writes
            .iter()
            .cloned()
            .map(|write| async move {
                self.store_commission_cas(
                    &write.deal_id,
                    write.expected_version,
                    write.snapshot.as_ref(),
                )
                .await
            })
            .collect();

        stream::iter(pending)
            .buffered(BULK_WRITE_CONCURRENCY)
            .collect()
            .await
    }

    /// Move a deal to `change.to_stage` and append the history row, atomically.
    ///
    /// `stage` and `stage_updated_at` are written by the same statement.
    /// Returns false (and writes nothing) if `expected_version` no longer matches.
    pub async fn apply_stage_change_cas(
        &self,
        expected_version: i64,
        change: &StageChange,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE deals
            SET stage = ?, stage_updated_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(change.to_stage.as_str())
        .bind(change.changed_at.as_ms())
        .bind(change.deal_id.as_str())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO deal_stage_history (deal_id, from_stage, to_stage, changed_at, note)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(change.deal_id.as_str())
        .bind(change.from_stage.as_str())
        .bind(change.to_stage.as_str())
        .bind(change.changed_at.as_ms())
        .bind(change.note.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Stage changes of a deal, oldest first.
    pub async fn list_stage_history(&self, id: &DealId) -> Result<Vec<StageChange>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT deal_id, from_stage, to_stage, changed_at, note
            FROM deal_stage_history
            WHERE deal_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(StageChange {
                    deal_id: DealId::new(r.get::<String, _>("deal_id")),
                    from_stage: stage_column(r, "from_stage")?,
                    to_stage: stage_column(r, "to_stage")?,
                    changed_at: TimeMs::new(r.get("changed_at")),
                    note: r.get("note"),
                })
            })
            .collect()
    }
}

fn encode_snapshot(snapshot: Option<&CommissionComputed>) -> Result<Option<String>, sqlx::Error> {
    snapshot
        .map(|s| {
            serde_json::to_string(s).map_err(|e| {
                sqlx::Error::Protocol(format!("failed to encode commission snapshot: {e}"))
            })
        })
        .transpose()
}

fn stage_column(row: &SqliteRow, column: &str) -> Result<Stage, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse::<Stage>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn deal_from_row(row: &SqliteRow) -> Result<Deal, sqlx::Error> {
    let id = DealId::new(row.get::<String, _>("id"));

    // The snapshot is a cache: an unreadable one is dropped, not fatal.
    let commission_computed = row
        .get::<Option<String>, _>("commission_computed")
        .and_then(|raw| match serde_json::from_str::<CommissionComputed>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(deal_id = %id, error = %e, "Failed to decode cached commission, treating as absent");
                None
            }
        });

    let offer = Offer {
        offer_number: row.get("offer_number"),
        amount: decimal_column(row, "offer_amount"),
        status: parse_column(&row.get::<String, _>("offer_status"))?,
        date: row.get::<Option<i64>, _>("offer_date").map(TimeMs::new),
        expiry_date: row.get::<Option<i64>, _>("offer_expiry").map(TimeMs::new),
        proof_of_funds_attached: row.get("offer_proof_of_funds"),
        conditions: row.get("offer_conditions"),
    };

    Ok(Deal {
        client_id: ClientId::new(row.get::<String, _>("client_id")),
        assigned_agent: AgentId::new(row.get::<String, _>("assigned_agent")),
        name: row.get("name"),
        property_address: row.get("property_address"),
        deal_type: parse_column(&row.get::<String, _>("deal_type"))?,
        stage: stage_column(row, "stage")?,
        stage_updated_at: TimeMs::new(row.get("stage_updated_at")),
        offer,
        commission_computed,
        created_at: TimeMs::new(row.get("created_at")),
        version: row.get("version"),
        id,
    })
}
