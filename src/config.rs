use anyhow::{Context, Result};

use crate::services::cell_events::periods::DEFAULT_MIN_RUN_DAYS;
use crate::services::evaluation::types::{
    EvalOptions, DEFAULT_GUARD_DAYS, DEFAULT_PERIOD_DAYS, DEFAULT_THRESHOLD,
};
use crate::services::evaluation::RetryPolicy;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub threshold: f64,
    pub period_days: i64,
    pub guard_days: i64,
    pub min_run_days: i64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("QUALITY_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("QUALITY_DATABASE_URL must be set")?;
        let database_url = normalize_database_url(database_url);

        let retry = RetryPolicy::default();
        Ok(Self {
            database_url,
            threshold: env_f64("QUALITY_EVAL_THRESHOLD", DEFAULT_THRESHOLD),
            period_days: env_i64("QUALITY_EVAL_PERIOD_DAYS", DEFAULT_PERIOD_DAYS),
            guard_days: env_i64("QUALITY_EVAL_GUARD_DAYS", DEFAULT_GUARD_DAYS),
            min_run_days: env_i64("QUALITY_MIN_RUN_DAYS", DEFAULT_MIN_RUN_DAYS),
            retry_attempts: env_u32("QUALITY_RETRY_ATTEMPTS", retry.attempts),
            retry_backoff_ms: env_u64(
                "QUALITY_RETRY_BACKOFF_MS",
                retry.initial_backoff.as_millis() as u64,
            ),
        })
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            threshold: self.threshold,
            period_days: self.period_days,
            guard_days: self.guard_days,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            initial_backoff: std::time::Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// SQLAlchemy-style driver suffixes show up in shared deployment configs.
fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_driver_suffix_from_database_url() {
        assert_eq!(
            normalize_database_url("postgresql+psycopg://u@h/db".to_string()),
            "postgresql://u@h/db"
        );
        assert_eq!(
            normalize_database_url("postgresql+asyncpg://u@h/db".to_string()),
            "postgresql://u@h/db"
        );
        assert_eq!(
            normalize_database_url("postgresql://u@h/db".to_string()),
            "postgresql://u@h/db"
        );
    }

    #[test]
    fn config_converts_to_valid_default_options() {
        let config = CoreConfig {
            database_url: "postgresql://u@h/db".to_string(),
            threshold: DEFAULT_THRESHOLD,
            period_days: DEFAULT_PERIOD_DAYS,
            guard_days: DEFAULT_GUARD_DAYS,
            min_run_days: DEFAULT_MIN_RUN_DAYS,
            retry_attempts: 3,
            retry_backoff_ms: 250,
        };
        assert!(config.eval_options().validate().is_ok());
    }
}
