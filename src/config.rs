//! Runtime configuration, read from the environment via figment.
//!
//! Durations accept either a bare number of seconds or a unit-suffixed string
//! (`"30s"`, `"5m"`, `"1500ms"`).

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Admin API hard cap on list page size.
const MAX_PAGE_SIZE: u32 = crate::shopify::query::MAX_PAGE_SIZE;

#[derive(Clone, Deserialize, custom_debug_derive::Debug)]
pub struct Config {
    /// Postgres connection string.
    #[debug(with = crate::fmt::redacted)]
    pub database_url: String,
    /// GraphQL Admin API endpoint.
    pub shopify_graphql_url: String,
    #[debug(with = crate::fmt::redacted)]
    pub shopify_access_token: String,

    #[serde(default = "default_port")]
    pub port: u16,
    /// Level applied to this crate's targets; everything else logs at `warn`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub cache_ttl: Duration,
    /// Default page size per sync run, clamped to `1..=250`.
    #[serde(default = "default_page_size", deserialize_with = "deserialize_page_size")]
    pub sync_page_size: u32,
    /// Budget for one whole run (fetch + reconcile).
    #[serde(default = "default_run_timeout", deserialize_with = "deserialize_duration")]
    pub sync_run_timeout: Duration,
    /// Per-request HTTP timeout for upstream calls.
    #[serde(default = "default_upstream_timeout", deserialize_with = "deserialize_duration")]
    pub upstream_timeout: Duration,
    /// Upstream requests allowed per second.
    #[serde(default = "default_rate_limit")]
    pub upstream_rate_limit: u32,
    #[serde(default = "default_shutdown_timeout", deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load from process environment variables (keys are case-insensitive).
    pub fn load() -> Result<Self, figment::Error> {
        use figment::{Figment, providers::Env};
        Figment::new().merge(Env::raw()).extract()
    }
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_page_size() -> u32 {
    50
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_rate_limit() -> u32 {
    2
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

const DURATION_UNITS: [TimeUnit; 4] = [
    TimeUnit::MilliSecond,
    TimeUnit::Second,
    TimeUnit::Minute,
    TimeUnit::Hour,
];

/// Parse a human duration; a bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_time_units(&DURATION_UNITS)
        .parse(s.trim())
        .map_err(|e| format!("invalid duration `{s}`: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration `{s}`: {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationRepr::deserialize(deserializer)? {
        DurationRepr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationRepr::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn deserialize_page_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let size = u32::deserialize(deserializer)?;
    Ok(size.clamp(1, MAX_PAGE_SIZE))
}
