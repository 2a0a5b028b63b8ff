use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    AgentId, Bucket, Client, ClientId, CommissionComputed, CommissionSettings,
    CommissionSettingsInput, Deal, DealId, DealType, Decimal, Offer, OfferPatch, StageChange,
    TimeMs, MAX_MONEY_AMOUNT,
};
use crate::engine::{summarize, CommissionSummary, SummaryScope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    BulkRecompute, CommissionCache, CommissionRecomputer, DealError, Recomputation,
    StageTransitionService, TransitionOutcome, MAX_CAS_ATTEMPTS,
};

/// Fields accepted when opening a deal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub name: String,
    #[serde(default)]
    pub property_address: Option<String>,
    pub deal_type: DealType,
}

/// A deal as listed under its client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealView {
    #[serde(flatten)]
    pub deal: Deal,
    pub deal_percentage: f64,
    pub commission_display: Option<Decimal>,
    pub bucket: Option<Bucket>,
}

impl DealView {
    fn new(deal: Deal, include_vat: bool) -> Self {
        let commission_display = deal
            .commission_computed
            .as_ref()
            .map(|c| display_amount(c, include_vat));
        DealView {
            deal_percentage: deal.stage.progress_pct(),
            bucket: deal.stage.bucket(),
            commission_display,
            deal,
        }
    }
}

fn display_amount(computed: &CommissionComputed, include_vat: bool) -> Decimal {
    if include_vat {
        computed.gross().round2()
    } else {
        computed.net.round2()
    }
}

/// Result of an offer edit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferChangeOutcome {
    pub offer: Offer,
    pub commission_computed: Option<CommissionComputed>,
    pub bucket: Option<Bucket>,
}

/// Result of saving commission settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSaved {
    pub settings: CommissionSettings,
    #[serde(flatten)]
    pub recompute: BulkRecompute,
}

/// Entry point for every deal workflow. Enforces tenancy, then delegates to
/// the commission cache and the stage transition service.
#[derive(Clone)]
pub struct DealOrchestrator {
    repo: Arc<Repository>,
    cache: Arc<dyn CommissionCache>,
    stages: StageTransitionService,
    default_currency: String,
}

impl DealOrchestrator {
    pub fn new(repo: Arc<Repository>, config: &Config) -> Self {
        Self {
            cache: Arc::new(CommissionRecomputer::new(repo.clone(), config.vat_rate)),
            stages: StageTransitionService::new(repo.clone(), config.stage_policy),
            default_currency: config.default_currency.clone(),
            repo,
        }
    }

    // =========================================================================
    // Clients
    // =========================================================================

    pub async fn create_client(
        &self,
        agent: &AgentId,
        name: &str,
        email: Option<String>,
    ) -> Result<Client, DealError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DealError::Validation("name is required".to_string()));
        }
        let client = Client::new(name.to_string(), email, agent.clone());
        self.repo.insert_client(&client).await?;
        info!(client_id = %client.id, agent = %agent, "Client created");
        Ok(client)
    }

    pub async fn get_client_for_agent(
        &self,
        client_id: &ClientId,
        agent: &AgentId,
    ) -> Result<Client, DealError> {
        let client = self
            .repo
            .get_client(client_id)
            .await?
            .ok_or_else(|| DealError::NotFound(format!("client {client_id}")))?;
        if !client.is_owned_by(agent) {
            return Err(DealError::Forbidden(format!(
                "client {client_id} is not assigned to agent {agent}"
            )));
        }
        Ok(client)
    }

    /// Validate, persist, then re-price every qualifying deal of the client.
    pub async fn on_commission_settings_saved(
        &self,
        client_id: &ClientId,
        agent: &AgentId,
        input: CommissionSettingsInput,
    ) -> Result<SettingsSaved, DealError> {
        self.get_client_for_agent(client_id, agent).await?;
        let settings = input
            .validate(&self.default_currency, TimeMs::now())
            .map_err(|e| DealError::Validation(e.to_string()))?;

        if !self
            .repo
            .save_commission_settings(client_id, &settings)
            .await?
        {
            return Err(DealError::NotFound(format!("client {client_id}")));
        }
        info!(
            client_id = %client_id,
            commission_type = settings.commission_type.as_str(),
            "Commission settings saved"
        );

        let recompute = self.cache.recompute_for_client(client_id).await?;
        Ok(SettingsSaved {
            settings,
            recompute,
        })
    }

    // =========================================================================
    // Deals
    // =========================================================================

    pub async fn create_deal(
        &self,
        client_id: &ClientId,
        agent: &AgentId,
        new_deal: NewDeal,
    ) -> Result<Deal, DealError> {
        self.get_client_for_agent(client_id, agent).await?;
        let name = new_deal.name.trim();
        if name.is_empty() {
            return Err(DealError::Validation("name is required".to_string()));
        }
        let deal = Deal::new(
            client_id.clone(),
            agent.clone(),
            name.to_string(),
            new_deal
                .property_address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            new_deal.deal_type,
        );
        self.repo.insert_deal(&deal).await?;
        info!(deal_id = %deal.id, client_id = %client_id, "Deal created");
        Ok(deal)
    }

    pub async fn get_deal_for_agent(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
    ) -> Result<Deal, DealError> {
        let deal = self
            .repo
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| DealError::NotFound(format!("deal {deal_id}")))?;
        if !deal.is_owned_by(agent) {
            return Err(DealError::Forbidden(format!(
                "deal {deal_id} is not assigned to agent {agent}"
            )));
        }
        Ok(deal)
    }

    pub async fn list_client_deals(
        &self,
        client_id: &ClientId,
        agent: &AgentId,
        include_vat: bool,
    ) -> Result<Vec<DealView>, DealError> {
        self.get_client_for_agent(client_id, agent).await?;
        let deals = self.repo.list_deals_for_client(client_id, agent).await?;
        Ok(deals
            .into_iter()
            .map(|d| DealView::new(d, include_vat))
            .collect())
    }

    /// Delete a deal along with its snapshot and stage history.
    pub async fn delete_deal(&self, deal_id: &DealId, agent: &AgentId) -> Result<(), DealError> {
        self.get_deal_for_agent(deal_id, agent).await?;
        if !self.repo.delete_deal(deal_id).await? {
            return Err(DealError::NotFound(format!("deal {deal_id}")));
        }
        info!(deal_id = %deal_id, "Deal deleted");
        Ok(())
    }

    // =========================================================================
    // Offer and commission
    // =========================================================================

    /// Merge `patch` into the deal's offer, clearing the snapshot in the same
    /// write, then recompute.
    pub async fn upsert_offer(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
        patch: OfferPatch,
    ) -> Result<OfferChangeOutcome, DealError> {
        match patch.amount {
            Some(amount) if amount.is_negative() => {
                return Err(DealError::Validation("amount must be >= 0".to_string()));
            }
            Some(amount) if amount > Decimal::from(MAX_MONEY_AMOUNT) => {
                return Err(DealError::Validation(format!(
                    "amount must be <= {MAX_MONEY_AMOUNT}"
                )));
            }
            _ => {}
        }

        let mut written = false;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let deal = self.get_deal_for_agent(deal_id, agent).await?;
            let mut offer = deal.offer.clone();
            offer.apply(patch.clone());
            if self.repo.update_offer_cas(deal_id, deal.version, &offer).await? {
                written = true;
                break;
            }
            debug!(deal_id = %deal_id, attempt, "Deal changed during offer update, retrying");
        }
        if !written {
            return Err(DealError::Conflict(format!(
                "deal {deal_id} kept changing while updating offer"
            )));
        }

        self.on_offer_changed(deal_id).await
    }

    /// Recompute the snapshot after an offer edit.
    pub async fn on_offer_changed(&self, deal_id: &DealId) -> Result<OfferChangeOutcome, DealError> {
        let recomputation = self.cache.recompute(deal_id).await?;
        let deal = self
            .repo
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| DealError::NotFound(format!("deal {deal_id}")))?;
        Ok(OfferChangeOutcome {
            offer: deal.offer,
            commission_computed: recomputation.into_snapshot(),
            bucket: deal.stage.bucket(),
        })
    }

    pub async fn recompute_deal(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
    ) -> Result<Recomputation, DealError> {
        self.get_deal_for_agent(deal_id, agent).await?;
        self.cache.recompute(deal_id).await
    }

    // =========================================================================
    // Stages
    // =========================================================================

    pub async fn advance_stage(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
        next_stage: &str,
        note: Option<String>,
    ) -> Result<TransitionOutcome, DealError> {
        self.stages
            .advance_stage(deal_id, agent, next_stage, note)
            .await
    }

    pub async fn stage_history(
        &self,
        deal_id: &DealId,
        agent: &AgentId,
    ) -> Result<Vec<StageChange>, DealError> {
        self.get_deal_for_agent(deal_id, agent).await?;
        Ok(self.repo.list_stage_history(deal_id).await?)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Expected and earned commission for an agent, optionally narrowed to
    /// one client.
    pub async fn commission_summary(
        &self,
        agent: &AgentId,
        client_id: Option<&ClientId>,
        scope: SummaryScope,
        include_vat: bool,
    ) -> Result<CommissionSummary, DealError> {
        if let Some(client_id) = client_id {
            self.get_client_for_agent(client_id, agent).await?;
        }

        let now = TimeMs::now();
        let since = scope.window_start(now);
        let mut deals = Vec::new();
        for stage in crate::domain::Stage::ALL {
            if stage.bucket().is_some() {
                deals.extend(
                    self.repo
                        .query_deals_at_stage(agent, client_id, stage, since)
                        .await?,
                );
            }
        }

        Ok(summarize(&deals, scope, include_vat, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{OfferStatus, Stage};
    use crate::engine::TransitionPolicy;
    use crate::orchestration::{GuardFailure, NotComputableReason};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (DealOrchestrator, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let config = Config {
            port: 0,
            database_path: db_path,
            vat_rate: d("0.20"),
            default_currency: "GBP".to_string(),
            stage_policy: TransitionPolicy::Permissive,
        };
        let orchestrator = DealOrchestrator::new(Arc::new(Repository::new(pool)), &config);
        (orchestrator, temp_dir)
    }

    fn percentage_input(rate: &str) -> CommissionSettingsInput {
        CommissionSettingsInput {
            engagement_type: Some("PerTransaction".to_string()),
            commission_type: Some("Percentage".to_string()),
            rate_pct: Some(d(rate)),
            fixed_fee: None,
            currency: None,
        }
    }

    fn fixed_input(fee: &str) -> CommissionSettingsInput {
        CommissionSettingsInput {
            engagement_type: Some("PerTransaction".to_string()),
            commission_type: Some("Fixed".to_string()),
            rate_pct: None,
            fixed_fee: Some(d(fee)),
            currency: None,
        }
    }

    fn accepted(amount: &str) -> OfferPatch {
        OfferPatch {
            amount: Some(d(amount)),
            status: Some(OfferStatus::Accepted),
            ..Default::default()
        }
    }

    fn new_deal(name: &str) -> NewDeal {
        NewDeal {
            name: name.to_string(),
            property_address: Some("1 High Street".to_string()),
            deal_type: DealType::BuyerRep,
        }
    }

    async fn client_with_deal(o: &DealOrchestrator, agent: &AgentId) -> (Client, Deal) {
        let client = o.create_client(agent, "Ada", None).await.unwrap();
        let deal = o
            .create_deal(&client.id, agent, new_deal("Elm Road"))
            .await
            .unwrap();
        (client, deal)
    }

    #[tokio::test]
    async fn test_percentage_commission_then_offer_accepted() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, deal) = client_with_deal(&o, &agent).await;

        let saved = o
            .on_commission_settings_saved(&client.id, &agent, percentage_input("2"))
            .await
            .unwrap();
        assert_eq!(saved.settings.currency, "GBP");
        assert_eq!(saved.recompute, BulkRecompute::default());

        let outcome = o.upsert_offer(&deal.id, &agent, accepted("500000")).await.unwrap();
        let snapshot = outcome.commission_computed.unwrap();
        assert_eq!(snapshot.net, d("10000.00"));
        assert_eq!(snapshot.tax, d("2000.00"));
        assert_eq!(outcome.bucket, None);

        let moved = o
            .advance_stage(&deal.id, &agent, "Offer Accepted", None)
            .await
            .unwrap();
        assert_eq!(moved.deal.stage, Stage::OfferAccepted);
    }

    #[tokio::test]
    async fn test_settings_change_reprices_without_moving_stage() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, deal) = client_with_deal(&o, &agent).await;
        o.on_commission_settings_saved(&client.id, &agent, percentage_input("2"))
            .await
            .unwrap();
        o.upsert_offer(&deal.id, &agent, accepted("500000")).await.unwrap();
        o.advance_stage(&deal.id, &agent, "Offer Accepted", None)
            .await
            .unwrap();

        let saved = o
            .on_commission_settings_saved(&client.id, &agent, fixed_input("5000"))
            .await
            .unwrap();
        assert_eq!(saved.recompute, BulkRecompute { matched: 1, modified: 1 });

        let reloaded = o.get_deal_for_agent(&deal.id, &agent).await.unwrap();
        assert_eq!(reloaded.stage, Stage::OfferAccepted);
        let snapshot = reloaded.commission_computed.unwrap();
        assert_eq!(snapshot.net, d("5000.00"));
        assert_eq!(snapshot.tax, d("1000.00"));
    }

    #[tokio::test]
    async fn test_rejected_offer_blocks_exchange() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, deal) = client_with_deal(&o, &agent).await;
        o.on_commission_settings_saved(&client.id, &agent, percentage_input("2"))
            .await
            .unwrap();
        o.upsert_offer(&deal.id, &agent, accepted("500000")).await.unwrap();

        let outcome = o
            .upsert_offer(
                &deal.id,
                &agent,
                OfferPatch {
                    status: Some(OfferStatus::Rejected),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.commission_computed.is_none());
        assert_eq!(outcome.offer.amount, Some(d("500000")));

        let err = o
            .advance_stage(&deal.id, &agent, "Exchange", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DealError::Precondition {
                target: Stage::Exchange,
                cause: GuardFailure::NoAcceptedOffer
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_and_not_saved() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, _deal) = client_with_deal(&o, &agent).await;

        let mut input = percentage_input("2");
        input.fixed_fee = Some(d("100"));
        let err = o
            .on_commission_settings_saved(&client.id, &agent, input)
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));

        let client = o.get_client_for_agent(&client.id, &agent).await.unwrap();
        assert!(client.commission_settings.is_none());
    }

    #[tokio::test]
    async fn test_tenancy_enforced() {
        let (o, _temp) = setup().await;
        let owner = AgentId::new("agent-1");
        let other = AgentId::new("agent-2");
        let (client, deal) = client_with_deal(&o, &owner).await;

        assert!(matches!(
            o.get_client_for_agent(&client.id, &other).await,
            Err(DealError::Forbidden(_))
        ));
        assert!(matches!(
            o.create_deal(&client.id, &other, new_deal("x")).await,
            Err(DealError::Forbidden(_))
        ));
        assert!(matches!(
            o.upsert_offer(&deal.id, &other, accepted("1")).await,
            Err(DealError::Forbidden(_))
        ));
        assert!(matches!(
            o.delete_deal(&deal.id, &other).await,
            Err(DealError::Forbidden(_))
        ));
        assert!(matches!(
            o.recompute_deal(&deal.id, &other).await,
            Err(DealError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_offer_amount_rejected() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (_client, deal) = client_with_deal(&o, &agent).await;
        let err = o
            .upsert_offer(&deal.id, &agent, accepted("-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));
    }

    #[tokio::test]
    async fn test_oversized_offer_amount_rejected_before_write() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, deal) = client_with_deal(&o, &agent).await;
        o.on_commission_settings_saved(&client.id, &agent, percentage_input("100"))
            .await
            .unwrap();
        o.upsert_offer(&deal.id, &agent, accepted("1000000000000000"))
            .await
            .unwrap();

        let err = o
            .upsert_offer(&deal.id, &agent, accepted("10000000000000000000000000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));

        let stored = o.get_deal_for_agent(&deal.id, &agent).await.unwrap();
        assert_eq!(stored.offer.amount, Some(d("1000000000000000")));
        assert_eq!(
            stored.commission_computed.unwrap().net,
            d("1000000000000000.00")
        );
    }

    #[tokio::test]
    async fn test_recompute_without_settings() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (_client, deal) = client_with_deal(&o, &agent).await;
        o.upsert_offer(&deal.id, &agent, accepted("250000")).await.unwrap();

        let outcome = o.recompute_deal(&deal.id, &agent).await.unwrap();
        assert_eq!(
            outcome,
            Recomputation::NotComputable(NotComputableReason::MissingSettings)
        );
    }

    #[tokio::test]
    async fn test_list_deals_with_display_and_bucket() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, deal) = client_with_deal(&o, &agent).await;
        o.create_deal(&client.id, &agent, new_deal("Second"))
            .await
            .unwrap();
        o.on_commission_settings_saved(&client.id, &agent, percentage_input("2"))
            .await
            .unwrap();
        o.upsert_offer(&deal.id, &agent, accepted("500000")).await.unwrap();
        o.advance_stage(&deal.id, &agent, "Exchange", None)
            .await
            .unwrap();

        let views = o.list_client_deals(&client.id, &agent, true).await.unwrap();
        assert_eq!(views.len(), 2);
        let view = views.iter().find(|v| v.deal.id == deal.id).unwrap();
        assert_eq!(view.deal_percentage, 83.33);
        assert_eq!(view.bucket, Some(Bucket::Earned));
        assert_eq!(view.commission_display, Some(d("12000.00")));

        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["stage"], "Exchange");
        assert_eq!(json["bucket"], "Earned");
        assert_eq!(json["dealPercentage"], 83.33);

        let without_vat = o.list_client_deals(&client.id, &agent, false).await.unwrap();
        let view = without_vat.iter().find(|v| v.deal.id == deal.id).unwrap();
        assert_eq!(view.commission_display, Some(d("10000.00")));
    }

    #[tokio::test]
    async fn test_commission_summary_buckets() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (client, expected) = client_with_deal(&o, &agent).await;
        let earned = o
            .create_deal(&client.id, &agent, new_deal("Earned"))
            .await
            .unwrap();
        o.on_commission_settings_saved(&client.id, &agent, percentage_input("2"))
            .await
            .unwrap();
        o.upsert_offer(&expected.id, &agent, accepted("500000")).await.unwrap();
        o.upsert_offer(&earned.id, &agent, accepted("100000")).await.unwrap();
        o.advance_stage(&expected.id, &agent, "Offer Accepted", None)
            .await
            .unwrap();
        o.advance_stage(&earned.id, &agent, "Exchange", None)
            .await
            .unwrap();

        let summary = o
            .commission_summary(&agent, None, SummaryScope::Month, false)
            .await
            .unwrap();
        assert_eq!(summary.totals.expected, d("10000.00"));
        assert_eq!(summary.totals.earned, d("2000.00"));

        let with_vat = o
            .commission_summary(&agent, Some(&client.id), SummaryScope::All, true)
            .await
            .unwrap();
        assert_eq!(with_vat.totals.expected, d("12000.00"));
        assert_eq!(with_vat.totals.earned, d("2400.00"));

        let other = o
            .commission_summary(&AgentId::new("agent-2"), None, SummaryScope::All, false)
            .await
            .unwrap();
        assert!(other.totals.expected.is_zero());
    }

    #[tokio::test]
    async fn test_delete_removes_history() {
        let (o, _temp) = setup().await;
        let agent = AgentId::new("agent-1");
        let (_client, deal) = client_with_deal(&o, &agent).await;
        o.advance_stage(&deal.id, &agent, "Viewings", Some("first viewing".to_string()))
            .await
            .unwrap();
        assert_eq!(o.stage_history(&deal.id, &agent).await.unwrap().len(), 1);

        o.delete_deal(&deal.id, &agent).await.unwrap();
        assert!(matches!(
            o.get_deal_for_agent(&deal.id, &agent).await,
            Err(DealError::NotFound(_))
        ));
        assert!(o.repo.list_stage_history(&deal.id).await.unwrap().is_empty());
    }
}
