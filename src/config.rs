use crate::domain::{Decimal, DEFAULT_CURRENCY};
use crate::engine::TransitionPolicy;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Flat VAT-style rate applied to net commission.
    pub vat_rate: Decimal,
    pub default_currency: String,
    pub stage_policy: TransitionPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let vat_rate = parse_vat_rate(env_map.get("VAT_RATE").map(|s| s.as_str()))?;

        let default_currency = match env_map.get("DEFAULT_CURRENCY").map(|s| s.trim()) {
            None => DEFAULT_CURRENCY.to_string(),
            Some("") => {
                return Err(ConfigError::InvalidValue(
                    "DEFAULT_CURRENCY".to_string(),
                    "must not be empty".to_string(),
                ))
            }
            Some(code) => code.to_string(),
        };

        let stage_policy = match env_map
            .get("STAGE_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("permissive")
        {
            "permissive" => TransitionPolicy::Permissive,
            "forward_only" => TransitionPolicy::ForwardOnly,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STAGE_POLICY".to_string(),
                    format!("must be permissive or forward_only, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            vat_rate,
            default_currency,
            stage_policy,
        })
    }
}

fn parse_vat_rate(raw: Option<&str>) -> Result<Decimal, ConfigError> {
    let invalid = || {
        ConfigError::InvalidValue(
            "VAT_RATE".to_string(),
            "must be a decimal between 0 and 1".to_string(),
        )
    };
    let rate = Decimal::from_str_canonical(raw.unwrap_or("0.20")).map_err(|_| invalid())?;
    if rate.is_negative() || rate > Decimal::from(1) {
        return Err(invalid());
    }
    Ok(rate)
}
