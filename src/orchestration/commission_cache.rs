//! The cached commission snapshot on each deal, and how it is kept current.
//!
//! The snapshot is always recomputed from scratch from the client's current
//! settings and the deal's offer; it is never patched in place. Writes are
//! compare-and-swap on the deal version.

use crate::db::{Repository, SnapshotWrite};
use crate::domain::{
    ClientId, CommissionComputed, CommissionSettings, CommissionSource, DealId, Decimal, TimeMs,
};
use crate::engine::compute_commission;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{DealError, GuardFailure, MAX_CAS_ATTEMPTS};

/// Why a deal has no commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotComputableReason {
    MissingSettings,
    NoAcceptedOffer,
}

impl From<NotComputableReason> for GuardFailure {
    fn from(reason: NotComputableReason) -> Self {
        match reason {
            NotComputableReason::MissingSettings => GuardFailure::MissingSettings,
            NotComputableReason::NoAcceptedOffer => GuardFailure::NoAcceptedOffer,
        }
    }
}

/// Outcome of recomputing one deal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recomputation {
    Computed(CommissionComputed),
    NotComputable(NotComputableReason),
}

impl Recomputation {
    pub fn snapshot(&self) -> Option<&CommissionComputed> {
        match self {
            Recomputation::Computed(snapshot) => Some(snapshot),
            Recomputation::NotComputable(_) => None,
        }
    }

    pub fn into_snapshot(self) -> Option<CommissionComputed> {
        match self {
            Recomputation::Computed(snapshot) => Some(snapshot),
            Recomputation::NotComputable(_) => None,
        }
    }
}

/// Counts reported by a bulk recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkRecompute {
    /// Deals that qualified for a commission.
    pub matched: usize,
    /// Deals whose snapshot was written.
    pub modified: usize,
}

/// Explicit invalidation contract for the per-deal commission snapshot.
#[async_trait]
pub trait CommissionCache: Send + Sync {
    /// Clear the snapshot of one deal.
    async fn invalidate(&self, deal_id: &DealId) -> Result<(), DealError>;

    /// Recompute and persist the snapshot of one deal, or clear it when the
    /// deal is not computable.
    async fn recompute(&self, deal_id: &DealId) -> Result<Recomputation, DealError>;

    /// Recompute every qualifying deal of a client. Best effort per deal.
    async fn recompute_for_client(&self, client_id: &ClientId)
        -> Result<BulkRecompute, DealError>;
}

/// `CommissionCache` backed by the repository.
#[derive(Clone)]
pub struct CommissionRecomputer {
    repo: Arc<Repository>,
    tax_rate: Decimal,
}

impl CommissionRecomputer {
    pub fn new(repo: Arc<Repository>, tax_rate: Decimal) -> Self {
        Self { repo, tax_rate }
    }

    fn build_snapshot(
        &self,
        settings: &CommissionSettings,
        offer_amount: Decimal,
        computed_at: TimeMs,
    ) -> Result<CommissionComputed, DealError> {
        let amounts = compute_commission(settings, offer_amount, self.tax_rate)?;
        Ok(CommissionComputed {
            net: amounts.net,
            tax: amounts.tax,
            currency: settings.currency.clone(),
            source: CommissionSource {
                offer_id: None,
                offer_amount,
                settings: settings.clone(),
                computed_at,
            },
        })
    }
}

#[async_trait]
impl CommissionCache for CommissionRecomputer {
    async fn invalidate(&self, deal_id: &DealId) -> Result<(), DealError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let deal = self
                .repo
                .get_deal(deal_id)
                .await?
                .ok_or_else(|| DealError::NotFound(format!("deal {deal_id}")))?;
            if deal.commission_computed.is_none() {
                return Ok(());
            }
            if self
                .repo
                .store_commission_cas(deal_id, deal.version, None)
                .await?
            {
                debug!(deal_id = %deal_id, "Commission snapshot invalidated");
                return Ok(());
            }
        }
        Err(DealError::Conflict(format!(
            "deal {deal_id} kept changing while invalidating commission"
        )))
    }

    async fn recompute(&self, deal_id: &DealId) -> Result<Recomputation, DealError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let deal = self
                .repo
                .get_deal(deal_id)
                .await?
                .ok_or_else(|| DealError::NotFound(format!("deal {deal_id}")))?;
            let settings = self.repo.get_commission_settings(&deal.client_id).await?;

            let outcome = match (settings, deal.offer.commissionable_amount()) {
                (None, _) => Recomputation::NotComputable(NotComputableReason::MissingSettings),
                (_, None) => Recomputation::NotComputable(NotComputableReason::NoAcceptedOffer),
                (Some(settings), Some(amount)) => {
                    Recomputation::Computed(self.build_snapshot(&settings, amount, TimeMs::now())?)
                }
            };

            // Nothing cached and nothing to cache.
            if outcome.snapshot().is_none() && deal.commission_computed.is_none() {
                return Ok(outcome);
            }

            if self
                .repo
                .store_commission_cas(deal_id, deal.version, outcome.snapshot())
                .await?
            {
                match &outcome {
                    Recomputation::Computed(snapshot) => {
                        info!(deal_id = %deal_id, commission = %snapshot, "Commission recomputed")
                    }
                    Recomputation::NotComputable(reason) => {
                        info!(deal_id = %deal_id, reason = ?reason, "Commission cleared")
                    }
                }
                return Ok(outcome);
            }
            debug!(deal_id = %deal_id, attempt, "Deal changed during recompute, retrying");
        }
        Err(DealError::Conflict(format!(
            "deal {deal_id} kept changing while recomputing commission"
        )))
    }

    async fn recompute_for_client(
        &self,
        client_id: &ClientId,
    ) -> Result<BulkRecompute, DealError> {
        let Some(settings) = self.repo.get_commission_settings(client_id).await? else {
            info!(client_id = %client_id, "No commission settings, skipping bulk recompute");
            return Ok(BulkRecompute::default());
        };

        let deals = self.repo.query_commissionable_deals(client_id).await?;
        let computed_at = TimeMs::now();

        let mut writes = Vec::with_capacity(deals.len());
        for deal in &deals {
            let Some(amount) = deal.offer.commissionable_amount() else {
                continue;
            };
            writes.push(SnapshotWrite {
                deal_id: deal.id.clone(),
                expected_version: deal.version,
                snapshot: Some(self.build_snapshot(&settings, amount, computed_at)?),
            });
        }

        let mut result = BulkRecompute {
            matched: writes.len(),
            modified: 0,
        };

        let outcomes = self.repo.store_commissions_bulk(&writes).await;
        for (write, outcome) in writes.iter().zip(outcomes) {
            match outcome {
                Ok(true) => result.modified += 1,
                // Someone else wrote this deal since it was read; redo it alone.
                Ok(false) => match self.recompute(&write.deal_id).await {
                    Ok(Recomputation::Computed(_)) => result.modified += 1,
                    Ok(Recomputation::NotComputable(reason)) => {
                        debug!(deal_id = %write.deal_id, reason = ?reason, "Deal no longer qualifies")
                    }
                    Err(DealError::NotFound(_)) => {
                        debug!(deal_id = %write.deal_id, "Deal deleted during bulk recompute")
                    }
                    Err(e) => {
                        warn!(deal_id = %write.deal_id, error = %e, "Failed to recompute commission")
                    }
                },
                Err(e) => {
                    warn!(deal_id = %write.deal_id, error = %e, "Failed to store recomputed commission")
                }
            }
        }

        info!(
            client_id = %client_id,
            matched = result.matched,
            modified = result.modified,
            "Bulk commission recompute finished"
        );
        Ok(result)
    }
}
