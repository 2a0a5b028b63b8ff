//! Guarded stage transitions.
//!
//! Entering a commission stage requires a cached commission with a positive
//! net. The guard and the write are tied together by the deal version: if the
//! snapshot changes between the read and the write, the write misses and the
//! whole check runs again on fresh state.

use crate::db::Repository;
use crate::domain::{AgentId, Deal, DealId, Stage, StageChange, TimeMs};
use crate::engine::TransitionPolicy;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DealError, GuardFailure, MAX_CAS_ATTEMPTS};

/// Longest note accepted on a stage change.
pub const MAX_NOTE_CHARS: usize = 500;

/// Result of an `advance_stage` call.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub deal: Deal,
    /// False when the deal was already at the requested stage.
    pub changed: bool,
}

#[derive(Clone)]
pub struct StageTransitionService {
    repo: Arc<Repository>,
    policy: TransitionPolicy,
}

impl StageTransitionService {
    pub fn new(repo: Arc<Repository>, policy: TransitionPolicy) -> Self {
        Self { repo, policy }
    }

    /// Move a deal to `next_stage` on behalf of `agent`.
    ///
    /// Does not recompute commission; callers refresh the snapshot first.
    pub async fn advance_stage(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
        next_stage: &str,
        note: Option<String>,
    ) -> Result<TransitionOutcome, DealError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut deal = self
                .repo
                .get_deal(deal_id)
                .await?
                .ok_or_else(|| DealError::NotFound(format!("deal {deal_id}")))?;
            if !deal.is_owned_by(agent) {
                return Err(DealError::Forbidden(format!(
                    "deal {deal_id} is not assigned to agent {agent}"
                )));
            }

            let target = next_stage
                .parse::<Stage>()
                .map_err(|e| DealError::Validation(e.to_string()))?;
            let note = normalize_note(note.clone())?;

            if target.requires_commission() {
                if let Some(cause) = self.commission_guard(&deal).await? {
                    return Err(DealError::Precondition { target, cause });
                }
            }

            if target == deal.stage {
                return Ok(TransitionOutcome {
                    deal,
                    changed: false,
                });
            }

            if !self.policy.allows(deal.stage, target) {
                return Err(DealError::Precondition {
                    target,
                    cause: GuardFailure::StageRegression { from: deal.stage },
                });
            }

            let change = StageChange {
                deal_id: deal.id.clone(),
                from_stage: deal.stage,
                to_stage: target,
                changed_at: TimeMs::now(),
                note,
            };
            if self.repo.apply_stage_change_cas(deal.version, &change).await? {
                info!(
                    deal_id = %deal.id,
                    from = %change.from_stage,
                    to = %change.to_stage,
                    "Deal stage changed"
                );
                deal.stage = change.to_stage;
                deal.stage_updated_at = change.changed_at;
                deal.version += 1;
                return Ok(TransitionOutcome {
                    deal,
                    changed: true,
                });
            }
            debug!(deal_id = %deal_id, attempt, "Deal changed during stage transition, retrying");
        }

        Err(DealError::Conflict(format!(
            "deal {deal_id} kept changing while advancing stage"
        )))
    }

    /// Commission guard for stages that count commission. `None` means the
    /// deal may enter the stage.
    async fn commission_guard(&self, deal: &Deal) -> Result<Option<GuardFailure>, DealError> {
        let failure = match &deal.commission_computed {
            Some(snapshot) if snapshot.net.is_positive() => None,
            Some(_) => Some(GuardFailure::ZeroNet),
            None if deal.offer.commissionable_amount().is_none() => {
                Some(GuardFailure::NoAcceptedOffer)
            }
            None => match self.repo.get_commission_settings(&deal.client_id).await? {
                Some(_) => Some(GuardFailure::NotComputed),
                None => Some(GuardFailure::MissingSettings),
            },
        };
        Ok(failure)
    }
}

fn normalize_note(note: Option<String>) -> Result<Option<String>, DealError> {
    let Some(note) = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_CHARS {
        return Err(DealError::Validation(format!(
            "note must be at most {MAX_NOTE_CHARS} characters"
        )));
    }
    Ok(Some(note))
}
