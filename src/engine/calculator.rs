use crate::domain::{CommissionSettings, CommissionType, Decimal};
use thiserror::Error;

/// Result of a commission computation, rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionAmounts {
    pub net: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommissionError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Compute net commission and tax for `offer_amount` under `settings`.
///
/// Percentage: `net = amount * rate_pct / 100`. Fixed: `net = fixed_fee`.
/// `net` is clamped at zero and rounded half away from zero to cents;
/// `tax = round2(net * tax_rate)`.
///
/// # Errors
/// Returns `CommissionError::Configuration` when the settings do not carry
/// exactly the field their commission type needs, carry a negative value, or
/// produce a figure too large to represent.
pub fn compute_commission(
    settings: &CommissionSettings,
    offer_amount: Decimal,
    tax_rate: Decimal,
) -> Result<CommissionAmounts, CommissionError> {
    let raw_net = match (settings.commission_type, settings.rate_pct, settings.fixed_fee) {
        (CommissionType::Percentage, Some(rate), None) => {
            ensure_non_negative("ratePct", rate)?;
            rate.checked_div(Decimal::hundred())
                .and_then(|fraction| offer_amount.checked_mul(fraction))
                .ok_or_else(|| {
                    CommissionError::Configuration(format!(
                        "ratePct={rate} of {offer_amount} is out of range"
                    ))
                })?
        }
        (CommissionType::Fixed, None, Some(fee)) => {
            ensure_non_negative("fixedFee", fee)?;
            fee
        }
        (commission_type, rate, fee) => {
            return Err(CommissionError::Configuration(format!(
                "{} commission with ratePct={} fixedFee={}",
                commission_type.as_str(),
                describe(rate),
                describe(fee)
            )))
        }
    };

    let net = raw_net.round2().floor_zero();
    let tax = net
        .checked_mul(tax_rate)
        .ok_or_else(|| {
            CommissionError::Configuration(format!("tax on {net} is out of range"))
        })?
        .round2();
    Ok(CommissionAmounts { net, tax })
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), CommissionError> {
    if value.is_negative() {
        return Err(CommissionError::Configuration(format!(
            "{field} must be >= 0, got {value}"
        )));
    }
    Ok(())
}

fn describe(value: Option<Decimal>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}
