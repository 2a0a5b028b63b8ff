//! Client commission settings and the cached commission snapshot on a deal.

use super::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CURRENCY: &str = "GBP";

/// Upper bound for `ratePct`.
pub const MAX_RATE_PCT: i64 = 100;

/// Upper bound for offer amounts and fixed fees.
pub const MAX_MONEY_AMOUNT: i64 = 1_000_000_000_000_000;

/// How the agent is engaged by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagementType {
    PerTransaction,
    Retainer,
    Sourcing,
    Rental,
}

impl EngagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementType::PerTransaction => "PerTransaction",
            EngagementType::Retainer => "Retainer",
            EngagementType::Sourcing => "Sourcing",
            EngagementType::Rental => "Rental",
        }
    }
}

impl FromStr for EngagementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PerTransaction" => Ok(EngagementType::PerTransaction),
            "Retainer" => Ok(EngagementType::Retainer),
            "Sourcing" => Ok(EngagementType::Sourcing),
            "Rental" => Ok(EngagementType::Rental),
            other => Err(format!("unknown engagement type {other:?}")),
        }
    }
}

/// How the commission amount is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommissionType {
    Percentage,
    Fixed,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::Percentage => "Percentage",
            CommissionType::Fixed => "Fixed",
        }
    }
}

impl FromStr for CommissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Percentage" => Ok(CommissionType::Percentage),
            "Fixed" => Ok(CommissionType::Fixed),
            other => Err(format!("unknown commission type {other:?}")),
        }
    }
}

/// Commission settings owned by a client.
///
/// Exactly one of `rate_pct` / `fixed_fee` is populated, matching
/// `commission_type`. Values built through [`CommissionSettingsInput::validate`]
/// always hold this; rows decoded from storage are re-checked by the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSettings {
    pub engagement_type: EngagementType,
    pub commission_type: CommissionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_fee: Option<Decimal>,
    pub currency: String,
    pub updated_at: TimeMs,
}

/// Unvalidated settings as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSettingsInput {
    pub engagement_type: Option<String>,
    pub commission_type: Option<String>,
    pub rate_pct: Option<Decimal>,
    pub fixed_fee: Option<Decimal>,
    pub currency: Option<String>,
}

/// Every problem found in a settings payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid commission settings: {}", .0.join(", "))]
pub struct SettingsError(pub Vec<String>);

impl CommissionSettingsInput {
    /// Validate the payload and stamp it with `updated_at`.
    ///
    /// Missing currency falls back to `default_currency`.
    pub fn validate(
        self,
        default_currency: &str,
        updated_at: TimeMs,
    ) -> Result<CommissionSettings, SettingsError> {
        let mut problems = Vec::new();

        let engagement_type = match self.engagement_type.as_deref() {
            None => {
                problems.push("engagementType is required".to_string());
                None
            }
            Some(raw) => raw.parse::<EngagementType>().map_err(|e| problems.push(e)).ok(),
        };

        let commission_type = match self.commission_type.as_deref() {
            None => {
                problems.push("commissionType is required".to_string());
                None
            }
            Some(raw) => raw.parse::<CommissionType>().map_err(|e| problems.push(e)).ok(),
        };

        let bounds = [
            ("ratePct", self.rate_pct, MAX_RATE_PCT),
            ("fixedFee", self.fixed_fee, MAX_MONEY_AMOUNT),
        ];
        for (field, value, max) in bounds {
            match value {
                Some(v) if v.is_negative() => problems.push(format!("{field} must be >= 0")),
                Some(v) if v > Decimal::from(max) => {
                    problems.push(format!("{field} must be <= {max}"))
                }
                _ => {}
            }
        }

        match commission_type {
            Some(CommissionType::Percentage) => {
                if self.rate_pct.is_none() {
                    problems.push("ratePct is required for Percentage commission".to_string());
                }
                if self.fixed_fee.is_some() {
                    problems.push("fixedFee is not allowed for Percentage commission".to_string());
                }
            }
            Some(CommissionType::Fixed) => {
                if self.fixed_fee.is_none() {
                    problems.push("fixedFee is required for Fixed commission".to_string());
                }
                if self.rate_pct.is_some() {
                    problems.push("ratePct is not allowed for Fixed commission".to_string());
                }
            }
            None => {}
        }

        let currency = match self.currency.map(|c| c.trim().to_string()) {
            Some(c) if c.is_empty() => {
                problems.push("currency must not be empty".to_string());
                String::new()
            }
            Some(c) => c,
            None => default_currency.to_string(),
        };

        match (engagement_type, commission_type) {
            (Some(engagement_type), Some(commission_type)) if problems.is_empty() => {
                Ok(CommissionSettings {
                    engagement_type,
                    commission_type,
                    rate_pct: self.rate_pct,
                    fixed_fee: self.fixed_fee,
                    currency,
                    updated_at,
                })
            }
            _ => Err(SettingsError(problems)),
        }
    }
}

/// Inputs frozen at the time a snapshot was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSource {
    /// Always null while a deal carries a single active offer.
    pub offer_id: Option<String>,
    pub offer_amount: Decimal,
    pub settings: CommissionSettings,
    pub computed_at: TimeMs,
}

/// Cached commission derived from client settings and the accepted offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionComputed {
    pub net: Decimal,
    pub tax: Decimal,
    pub currency: String,
    pub source: CommissionSource,
}

impl CommissionComputed {
    /// Net plus tax, rounded to cents.
    pub fn gross(&self) -> Decimal {
        (self.net + self.tax).round2()
    }
}

impl fmt::Display for CommissionComputed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (+{} tax)",
            self.currency,
            self.net.to_money_string(),
            self.tax.to_money_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn input(commission_type: &str) -> CommissionSettingsInput {
        CommissionSettingsInput {
            engagement_type: Some("PerTransaction".to_string()),
            commission_type: Some(commission_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_percentage_requires_rate() {
        let err = input("Percentage")
            .validate("GBP", TimeMs::new(1))
            .unwrap_err();
        assert_eq!(
            err.0,
            vec!["ratePct is required for Percentage commission".to_string()]
        );
    }

    #[test]
    fn test_fixed_forbids_rate() {
        let mut payload = input("Fixed");
        payload.fixed_fee = Some(d("5000"));
        payload.rate_pct = Some(d("2"));
        let err = payload.validate("GBP", TimeMs::new(1)).unwrap_err();
        assert!(err.0.iter().any(|p| p.contains("ratePct is not allowed")));
    }

    #[test]
    fn test_negative_values_rejected() {
        let mut payload = input("Percentage");
        payload.rate_pct = Some(d("-1"));
        let err = payload.validate("GBP", TimeMs::new(1)).unwrap_err();
        assert!(err.0.contains(&"ratePct must be >= 0".to_string()));
    }

    #[test]
    fn test_rate_capped_at_one_hundred() {
        let mut payload = input("Percentage");
        payload.rate_pct = Some(d("100"));
        assert!(payload.clone().validate("GBP", TimeMs::new(1)).is_ok());

        payload.rate_pct = Some(d("100.01"));
        let err = payload.validate("GBP", TimeMs::new(1)).unwrap_err();
        assert_eq!(err.0, vec!["ratePct must be <= 100".to_string()]);
    }

    #[test]
    fn test_fixed_fee_capped() {
        let mut payload = input("Fixed");
        payload.fixed_fee = Some(d("1000000000000000"));
        assert!(payload.clone().validate("GBP", TimeMs::new(1)).is_ok());

        payload.fixed_fee = Some(d("1000000000000000.01"));
        let err = payload.validate("GBP", TimeMs::new(1)).unwrap_err();
        assert_eq!(
            err.0,
            vec![format!("fixedFee must be <= {MAX_MONEY_AMOUNT}")]
        );
    }

    #[test]
    fn test_unknown_types_collected() {
        let payload = CommissionSettingsInput {
            engagement_type: Some("Barter".to_string()),
            commission_type: Some("Tiered".to_string()),
            ..Default::default()
        };
        let err = payload.validate("GBP", TimeMs::new(1)).unwrap_err();
        assert_eq!(err.0.len(), 2);
    }

    #[test]
    fn test_valid_percentage_defaults_currency() {
        let mut payload = input("Percentage");
        payload.rate_pct = Some(d("2"));
        let settings = payload.validate("GBP", TimeMs::new(42)).unwrap();
        assert_eq!(settings.commission_type, CommissionType::Percentage);
        assert_eq!(settings.rate_pct, Some(d("2")));
        assert_eq!(settings.fixed_fee, None);
        assert_eq!(settings.currency, "GBP");
        assert_eq!(settings.updated_at, TimeMs::new(42));
    }

    #[test]
    fn test_settings_json_shape() {
        let mut payload = input("Fixed");
        payload.fixed_fee = Some(d("5000"));
        payload.currency = Some("EUR".to_string());
        let settings = payload.validate("GBP", TimeMs::new(1)).unwrap();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["commissionType"], "Fixed");
        assert_eq!(json["currency"], "EUR");
        assert!(json.get("ratePct").is_none());
    }
}
