use std::time::Duration;

use crate::jobs::runner::RunnerConfig;

/// Runtime configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub log_json: bool,
    pub persist_max_attempts: u32,
    pub persist_retry_ms: u64,
    pub shutdown_grace_ms: u64,
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://jobrunner.db?mode=rwc";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("JOBRUNNER_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let admin_addr = env_or_fallback("JOBRUNNER_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("JOBRUNNER_MIGRATE_ON_STARTUP").unwrap_or(true);
        let log_json = env_bool("JOBRUNNER_LOG_JSON").unwrap_or(false);

        let persist_max_attempts = env_parse("JOBRUNNER_PERSIST_MAX_ATTEMPTS")?.unwrap_or(5);
        if persist_max_attempts == 0 {
            anyhow::bail!("JOBRUNNER_PERSIST_MAX_ATTEMPTS must be > 0");
        }
        let persist_retry_ms = env_parse("JOBRUNNER_PERSIST_RETRY_MS")?.unwrap_or(200);
        let shutdown_grace_ms = env_parse("JOBRUNNER_SHUTDOWN_GRACE_MS")?.unwrap_or(5_000);

        Ok(Self {
            database_url,
            admin_addr,
            migrate_on_startup,
            log_json,
            persist_max_attempts,
            persist_retry_ms,
            shutdown_grace_ms,
        })
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            persist_max_attempts: self.persist_max_attempts,
            persist_retry_delay: Duration::from_millis(self.persist_retry_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={v:?} is invalid: {e}")),
        _ => Ok(None),
    }
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
