//! Typed process configuration, loaded once from `RIDE_`-prefixed environment variables.
//!
//! Mirrors the source's module-level configuration constants, made explicit and centralized: each
//! field below corresponds to one dotted key named in the external interface description, upper-cased
//! with `.`/`-` replaced by `_` and prefixed `RIDE_` to form the environment variable (e.g.
//! `store.dsn` -> `RIDE_STORE_DSN`).

use std::time::Duration;

use anyhow::Context as _;

const DEFAULT_LOG_DIRECTIVE: &str = "info";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Conf {
    pub ride_table: String,
    pub driver_topic: String,
    pub driver_key: String,
    pub bus_brokers: String,
    pub store_dsn: String,
    pub auth_secret: Vec<u8>,
    pub biller_base_cost: f64,
    pub biller_km_charge: f64,
    pub http_addr_driver: String,
    pub http_addr_passenger: String,
    pub http_addr_ride: String,
    pub log_directive: String,
    pub outbox_sweep_interval: Duration,
    /// External geo index endpoint. No remote adapter is implemented yet (see DESIGN.md); when
    /// set, the gateway logs a warning and falls back to the in-process index.
    pub geo_addr: Option<String>,
}

impl Conf {
    /// Loads configuration from the process environment. Fails fast on any missing required
    /// variable so misconfiguration is a startup failure, never a later silent default.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            ride_table: require_env("RIDE_RIDE_TABLE")?,
            driver_topic: require_env("RIDE_RIDE_DRIVER_TOPIC")?,
            driver_key: require_env("RIDE_RIDE_DRIVER_KEY")?,
            bus_brokers: require_env("RIDE_BUS_BROKERS")?,
            store_dsn: require_env("RIDE_STORE_DSN")?,
            auth_secret: require_env("RIDE_AUTH_SECRET")?.into_bytes(),
            biller_base_cost: parse_env("RIDE_BILLER_BASE_COST")?,
            biller_km_charge: parse_env("RIDE_BILLER_KM_CHARGE")?,
            http_addr_driver: require_env("RIDE_HTTP_ADDR_DRIVER")?,
            http_addr_passenger: require_env("RIDE_HTTP_ADDR_PASSENGER")?,
            http_addr_ride: require_env("RIDE_HTTP_ADDR_RIDE")?,
            log_directive: optional_env("RIDE_LOG_DIRECTIVE", DEFAULT_LOG_DIRECTIVE),
            outbox_sweep_interval: Duration::from_secs(
                optional_env("RIDE_OUTBOX_SWEEP_INTERVAL_SECS", &DEFAULT_SWEEP_INTERVAL_SECS.to_string())
                    .parse()
                    .context("RIDE_OUTBOX_SWEEP_INTERVAL_SECS must be an integer number of seconds")?,
            ),
            geo_addr: std::env::var("RIDE_GEO_ADDR").ok(),
        })
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    require_env(key)?.parse().with_context(|| format!("{key} is not a valid value"))
}
