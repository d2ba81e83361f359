use crate::domain::{
    Amount, ATTRIBUTION_WINDOW_RANGE, DEFAULT_ATTRIBUTION_WINDOW_DAYS,
    DEFAULT_CLEARANCE_PERIOD_DAYS,
};
use crate::engine::DedupPolicy;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub attribution_window_days: i64,
    pub direct_attribution_window_days: i64,
    pub clearance_period_days: i64,
    pub dedup_policy: DedupPolicy,
    pub notification_capacity: usize,
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
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let attribution_window_days = parse_window(
            &env_map,
            "ATTRIBUTION_WINDOW_DAYS",
            DEFAULT_ATTRIBUTION_WINDOW_DAYS,
        )?;
        let direct_attribution_window_days = parse_window(
            &env_map,
            "DIRECT_ATTRIBUTION_WINDOW_DAYS",
            DEFAULT_ATTRIBUTION_WINDOW_DAYS,
        )?;

        let clearance_period_days = parse_or(
            &env_map,
            "CLEARANCE_PERIOD_DAYS",
            DEFAULT_CLEARANCE_PERIOD_DAYS,
            "must be a non-negative integer",
        )?;
        if clearance_period_days < 0 {
            return Err(ConfigError::InvalidValue(
                "CLEARANCE_PERIOD_DAYS".to_string(),
                "must be a non-negative integer".to_string(),
            ));
        }

        let defaults = DedupPolicy::default();
        let dedup_policy = DedupPolicy {
            same_day_tolerance: parse_tolerance(
                &env_map,
                "DEDUP_SAME_DAY_TOLERANCE",
                defaults.same_day_tolerance,
            )?,
            same_hour_tolerance: parse_tolerance(
                &env_map,
                "DEDUP_SAME_HOUR_TOLERANCE",
                defaults.same_hour_tolerance,
            )?,
            ..defaults
        };

        let notification_capacity = parse_or(
            &env_map,
            "NOTIFICATION_CAPACITY",
            256usize,
            "must be a positive integer",
        )?;
        if notification_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "NOTIFICATION_CAPACITY".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            attribution_window_days,
            direct_attribution_window_days,
            clearance_period_days,
            dedup_policy,
            notification_capacity,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    hint: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), hint.to_string())),
    }
}

fn parse_window(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let days = parse_or(env_map, key, default, "must be an integer between 1 and 90")?;
    if !ATTRIBUTION_WINDOW_RANGE.contains(&days) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be between 1 and 90, got {}", days),
        ));
    }
    Ok(days)
}

fn parse_tolerance(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Amount,
) -> Result<Amount, ConfigError> {
    let value = parse_or(env_map, key, default, "must be a decimal amount")?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}
