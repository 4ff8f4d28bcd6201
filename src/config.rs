//! # Configuration Module
//!
//! This module defines configuration structures for the directory API,
//! including geocoding cache settings, upstream limits and the environment
//! variables read at startup.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

// Constants for gateway configuration
pub const DEFAULT_DATABASE_PATH: &str = "medical_data.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_GEOCODE_TTL_SECS: u64 = 24 * 60 * 60; // 24 hours
pub const DEFAULT_NEGATIVE_TTL_SECS: u64 = 60 * 60; // 1 hour
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Upstream endpoints and static map defaults
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Yandex geocoder endpoint
    pub geocoder_url: String,
    /// Yandex static maps endpoint
    pub static_map_url: String,
    /// API key for the geocoder; `None` disables geocoding
    pub api_key: Option<String>,
    /// Total timeout for one upstream request
    pub request_timeout: Duration,
    /// Timeout for establishing the connection
    pub connect_timeout: Duration,
    /// Image size passed as `size=w,h`
    pub map_size: (u32, u32),
    /// Zoom level passed as `z`
    pub map_zoom: u8,
    /// Marker style appended to `pt`
    pub marker_style: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            geocoder_url: "https://geocode-maps.yandex.ru/1.x/".to_string(),
            static_map_url: "https://static-maps.yandex.ru/1.x/".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            map_size: (400, 300),
            map_zoom: 15,
            marker_style: "pm2rdm".to_string(),
        }
    }
}

/// Cache and coalescing settings for the geocoding gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Lifetime of a successful lookup; `None` keeps entries forever
    pub positive_ttl: Option<Duration>,
    /// Lifetime of a "no match" lookup; `None` keeps entries forever
    pub negative_ttl: Option<Duration>,
    /// Maximum number of cached queries
    pub cache_capacity: usize,
    /// Serialize concurrent misses for the same query onto one upstream call
    pub single_flight: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Some(Duration::from_secs(DEFAULT_GEOCODE_TTL_SECS)),
            negative_ttl: Some(Duration::from_secs(DEFAULT_NEGATIVE_TTL_SECS)),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            single_flight: false,
        }
    }
}

/// Log output format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Everything the server process reads from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub upstream: UpstreamConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    ///
    /// Unset variables fall back to the defaults above. Malformed numeric
    /// values are reported as errors rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut upstream = UpstreamConfig {
            api_key: non_empty("YANDEX_API_KEY"),
            ..Default::default()
        };
        if let Some(secs) = parse_var::<u64>(&non_empty, "UPSTREAM_TIMEOUT_SECS")? {
            upstream.request_timeout = Duration::from_secs(secs);
        }

        let mut gateway = GatewayConfig::default();
        if let Some(secs) = parse_var::<u64>(&non_empty, "GEOCODE_TTL_SECS")? {
            gateway.positive_ttl = ttl_from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&non_empty, "GEOCODE_NEGATIVE_TTL_SECS")? {
            gateway.negative_ttl = ttl_from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&non_empty, "GEOCODE_CACHE_CAPACITY")? {
            gateway.cache_capacity = capacity.max(1);
        }
        if let Some(flag) = parse_var::<bool>(&non_empty, "GEOCODE_SINGLE_FLIGHT")? {
            gateway.single_flight = flag;
        }

        let log_format = match non_empty("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            database_path: non_empty("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            log_format,
            upstream,
            gateway,
        })
    }
}

// 0 means "never expires"
fn ttl_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("Invalid value for {key}: {raw}"))
        })
        .transpose()
}
