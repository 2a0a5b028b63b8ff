//! Expected/earned commission totals over a reporting window.

use crate::domain::{Bucket, Deal, Decimal, TimeMs};
use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;

/// Reporting window ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryScope {
    Week,
    Month,
    Quarter,
    Year,
    All,
}

impl SummaryScope {
    /// Parse a scope name; anything unrecognised falls back to `Month`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("week") => SummaryScope::Week,
            Some("quarter") => SummaryScope::Quarter,
            Some("year") => SummaryScope::Year,
            Some("all") => SummaryScope::All,
            _ => SummaryScope::Month,
        }
    }

    /// Inclusive lower bound of the window ending at `now`.
    pub fn window_start(&self, now: TimeMs) -> TimeMs {
        let Some(now_dt) = DateTime::<Utc>::from_timestamp_millis(now.as_ms()) else {
            return TimeMs::new(0);
        };
        let start = match self {
            SummaryScope::All => return TimeMs::new(0),
            SummaryScope::Week => now_dt.checked_sub_signed(Duration::days(7)),
            SummaryScope::Month => now_dt.checked_sub_months(Months::new(1)),
            SummaryScope::Quarter => now_dt.checked_sub_months(Months::new(3)),
            SummaryScope::Year => now_dt.checked_sub_months(Months::new(12)),
        };
        start.map_or(TimeMs::new(0), |dt| TimeMs::new(dt.timestamp_millis()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketTotals {
    pub net: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub expected: BucketTotals,
    pub earned: BucketTotals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub expected: Decimal,
    pub earned: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSummary {
    pub scope: SummaryScope,
    #[serde(rename = "includeVAT")]
    pub include_vat: bool,
    pub totals: Totals,
    pub breakdown: Breakdown,
}

/// Sum cached commissions of deals sitting in a commission bucket whose
/// stage was entered within `[window_start, now]`.
pub fn summarize(
    deals: &[Deal],
    scope: SummaryScope,
    include_vat: bool,
    now: TimeMs,
) -> CommissionSummary {
    let from = scope.window_start(now);
    let mut breakdown = Breakdown::default();

    for deal in deals {
        if deal.stage_updated_at < from || deal.stage_updated_at > now {
            continue;
        }
        let (Some(bucket), Some(computed)) = (deal.stage.bucket(), &deal.commission_computed)
        else {
            continue;
        };
        let slot = match bucket {
            Bucket::Expected => &mut breakdown.expected,
            Bucket::Earned => &mut breakdown.earned,
        };
        slot.net = slot.net + computed.net;
        slot.tax = slot.tax + computed.tax;
    }

    let total = |b: &BucketTotals| {
        if include_vat {
            (b.net + b.tax).round2()
        } else {
            b.net.round2()
        }
    };

    CommissionSummary {
        scope,
        include_vat,
        totals: Totals {
            expected: total(&breakdown.expected),
            earned: total(&breakdown.earned),
        },
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AgentId, ClientId, CommissionComputed, CommissionSettings, CommissionSource,
        CommissionType, DealType, EngagementType, Stage,
    };

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn deal(stage: Stage, stage_updated_at: i64, net: Option<&str>) -> Deal {
        let mut deal = Deal::new(
            ClientId::new("c1"),
            AgentId::new("a1"),
            "deal".to_string(),
            None,
            DealType::BuyerRep,
        );
        deal.stage = stage;
        deal.stage_updated_at = TimeMs::new(stage_updated_at);
        deal.commission_computed = net.map(|n| CommissionComputed {
            net: d(n),
            tax: d(n).checked_mul(d("0.2")).unwrap().round2(),
            currency: "GBP".to_string(),
            source: CommissionSource {
                offer_id: None,
                offer_amount: d("1"),
                settings: CommissionSettings {
                    engagement_type: EngagementType::PerTransaction,
                    commission_type: CommissionType::Fixed,
                    rate_pct: None,
                    fixed_fee: Some(d(n)),
                    currency: "GBP".to_string(),
                    updated_at: TimeMs::new(0),
                },
                computed_at: TimeMs::new(0),
            },
        });
        deal
    }

    #[test]
    fn test_scope_parsing_falls_back_to_month() {
        assert_eq!(SummaryScope::parse_lenient(Some("WEEK")), SummaryScope::Week);
        assert_eq!(SummaryScope::parse_lenient(Some("decade")), SummaryScope::Month);
        assert_eq!(SummaryScope::parse_lenient(None), SummaryScope::Month);
    }

    #[test]
    fn test_week_window() {
        let now = TimeMs::new(100 * DAY_MS);
        assert_eq!(SummaryScope::Week.window_start(now), TimeMs::new(93 * DAY_MS));
        assert_eq!(SummaryScope::All.window_start(now), TimeMs::new(0));
    }

    #[test]
    fn test_buckets_and_vat_toggle() {
        let now = TimeMs::new(400 * DAY_MS);
        let deals = vec![
            deal(Stage::OfferAccepted, 399 * DAY_MS, Some("10000")),
            deal(Stage::Exchange, 398 * DAY_MS, Some("5000")),
            deal(Stage::Exchange, 397 * DAY_MS, Some("2500")),
            // outside the month window
            deal(Stage::Exchange, 10 * DAY_MS, Some("99999")),
            // not a commission bucket
            deal(Stage::Completion, 399 * DAY_MS, Some("777")),
            // bucket stage without a snapshot
            deal(Stage::OfferAccepted, 399 * DAY_MS, None),
        ];

        let net_only = summarize(&deals, SummaryScope::Month, false, now);
        assert_eq!(net_only.totals.expected, d("10000"));
        assert_eq!(net_only.totals.earned, d("7500"));
        assert_eq!(net_only.breakdown.earned.tax, d("1500"));

        let gross = summarize(&deals, SummaryScope::Month, true, now);
        assert_eq!(gross.totals.expected, d("12000"));
        assert_eq!(gross.totals.earned, d("9000"));

        let all = summarize(&deals, SummaryScope::All, false, now);
        assert_eq!(all.totals.earned, d("107499"));
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = summarize(&[], SummaryScope::Year, true, TimeMs::now());
        assert_eq!(summary.totals, Totals::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["scope"], "year");
        assert_eq!(json["includeVAT"], true);
    }
}
