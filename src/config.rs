use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_dir: String,

    /// Offset applied to the system clock to get the attendance day and times.
    pub utc_offset_minutes: i32,
    pub worklist_cache_ttl_secs: u64,

    // Rate limiting
    pub rate_submit_per_min: u32,
    pub rate_query_per_min: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            // default Mexico City (UTC-6, no DST)
            utc_offset_minutes: parse_var("UTC_OFFSET_MINUTES", "-360")?,
            worklist_cache_ttl_secs: parse_var("WORKLIST_CACHE_TTL_SECS", "30")?,

            rate_submit_per_min: parse_var("RATE_SUBMIT_PER_MIN", "30")?,
            rate_query_per_min: parse_var("RATE_QUERY_PER_MIN", "600")?,
        };

        // fail at startup rather than on the first request
        config.utc_offset()?;

        Ok(config)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {}", self.utc_offset_minutes))
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}

fn parse_var<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}

#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        database_url: "memory://".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        api_prefix: "/api".to_string(),
        log_dir: "logs".to_string(),
        utc_offset_minutes: -360,
        worklist_cache_ttl_secs: 30,
        rate_submit_per_min: 1000,
        rate_query_per_min: 1000,
    }
}
