use std::time::Duration;

use anyhow::Context;
use chrono::FixedOffset;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CLASSIFIER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub query_timeout: Duration,
    pub utc_offset: FixedOffset,
    pub classifier_endpoint: Option<String>,
    pub classifier_timeout: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let query_timeout = Duration::from_millis(
            env_parse("INSIGHT_QUERY_TIMEOUT_MS").unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
        );
        let classifier_timeout = Duration::from_millis(
            env_parse("CLASSIFIER_TIMEOUT_MS").unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_MS),
        );

        let offset_minutes: i32 = env_parse("INSIGHT_UTC_OFFSET_MINUTES").unwrap_or(0);
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).with_context(|| {
            format!("INSIGHT_UTC_OFFSET_MINUTES={offset_minutes} is not a valid UTC offset")
        })?;

        let classifier_endpoint = env_string("CLASSIFIER_ENDPOINT");
        let log_level = env_string("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            database_url,
            max_connections,
            query_timeout,
            utc_offset,
            classifier_endpoint,
            classifier_timeout,
            log_level,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}
