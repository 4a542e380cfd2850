//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::SweeperConfig;
use domain::EngineConfig;

pub const DEFAULT_VELOCITY_LOOKBACK_DAYS: u32 = 30;
pub const DEFAULT_ORDER_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_ORDER_PAGES: u32 = 5;
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024;
pub const DEFAULT_RESERVE_MAX_BODY_BYTES: usize = 16 * 1024;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `SWEEP_INTERVAL_SECS`: expiry sweep period; `0` disables the scheduler
///
/// plus the [`ServiceConfig`] variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub sweep_interval: Option<Duration>,
    pub service: ServiceConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(var("PORT")).unwrap_or(3000),
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            sweep_interval: parse::<u64>(var("SWEEP_INTERVAL_SECS"))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            service: ServiceConfig {
                velocity_lookback_days: parse(var("VELOCITY_LOOKBACK_DAYS")).unwrap_or(0),
                order_page_size: parse(var("ORDER_PAGE_SIZE")).unwrap_or(0),
                max_order_pages: parse(var("MAX_ORDER_PAGES")).unwrap_or(0),
                default_actor_id: var("CLEANUP_DEFAULT_ACTOR_ID").unwrap_or_default(),
                default_reason: var("CLEANUP_DEFAULT_REASON").unwrap_or_default(),
                max_body_bytes: parse(var("MAX_BODY_BYTES")).unwrap_or(0),
                reserve_max_body_bytes: parse(var("RESERVE_MAX_BODY_BYTES")).unwrap_or(0),
                sweep_default_limit: parse(var("SWEEP_DEFAULT_LIMIT")).unwrap_or(0),
                sweep_max_limit: parse(var("SWEEP_MAX_LIMIT")).unwrap_or(0),
            }
            .normalized(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            sweep_interval: None,
            service: ServiceConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

/// Tunables for the checkout and maintenance endpoints.
///
/// Zero or empty values mean "use the default"; call [`normalized`](Self::normalized)
/// before reading them. The velocity and order paging fields belong to the
/// reporting jobs that share this record and are only carried through here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub velocity_lookback_days: u32,
    pub order_page_size: u32,
    pub max_order_pages: u32,
    pub default_actor_id: String,
    pub default_reason: String,
    /// Body cap for commit, release and cleanup requests.
    pub max_body_bytes: usize,
    pub reserve_max_body_bytes: usize,
    pub sweep_default_limit: usize,
    pub sweep_max_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            velocity_lookback_days: 0,
            order_page_size: 0,
            max_order_pages: 0,
            default_actor_id: String::new(),
            default_reason: String::new(),
            max_body_bytes: 0,
            reserve_max_body_bytes: 0,
            sweep_default_limit: 0,
            sweep_max_limit: 0,
        }
        .normalized()
    }
}

impl ServiceConfig {
    /// Replaces zero and blank values with the named defaults.
    pub fn normalized(self) -> Self {
        let sweeper = SweeperConfig {
            default_actor_id: self.default_actor_id,
            default_reason: self.default_reason,
        }
        .normalized();
        let engine = EngineConfig {
            default_sweep_limit: self.sweep_default_limit,
            max_sweep_limit: self.sweep_max_limit,
        }
        .normalized();

        Self {
            velocity_lookback_days: or_default(
                self.velocity_lookback_days,
                DEFAULT_VELOCITY_LOOKBACK_DAYS,
            ),
            order_page_size: or_default(self.order_page_size, DEFAULT_ORDER_PAGE_SIZE),
            max_order_pages: or_default(self.max_order_pages, DEFAULT_MAX_ORDER_PAGES),
            default_actor_id: sweeper.default_actor_id,
            default_reason: sweeper.default_reason,
            max_body_bytes: or_default(self.max_body_bytes, DEFAULT_MAX_BODY_BYTES),
            reserve_max_body_bytes: or_default(
                self.reserve_max_body_bytes,
                DEFAULT_RESERVE_MAX_BODY_BYTES,
            ),
            sweep_default_limit: engine.default_sweep_limit,
            sweep_max_limit: engine.max_sweep_limit,
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            default_sweep_limit: self.sweep_default_limit,
            max_sweep_limit: self.sweep_max_limit,
        }
        .normalized()
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            default_actor_id: self.default_actor_id.clone(),
            default_reason: self.default_reason.clone(),
        }
        .normalized()
    }
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn service_defaults() {
        let service = ServiceConfig::default();
        assert_eq!(service.velocity_lookback_days, 30);
        assert_eq!(service.order_page_size, 100);
        assert_eq!(service.max_order_pages, 5);
        assert_eq!(service.default_actor_id, "system:maintenance");
        assert_eq!(service.default_reason, "expired_maintenance_cleanup");
        assert_eq!(service.max_body_bytes, 4096);
        assert_eq!(service.reserve_max_body_bytes, 16384);
        assert_eq!(service.sweep_default_limit, 100);
        assert_eq!(service.sweep_max_limit, 500);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/inventory"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("CLEANUP_DEFAULT_ACTOR_ID", "system:cron"),
            ("MAX_BODY_BYTES", "not-a-number"),
            ("SWEEP_DEFAULT_LIMIT", "25"),
        ]));

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/inventory")
        );
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.service.default_actor_id, "system:cron");
        assert_eq!(config.service.default_reason, "expired_maintenance_cleanup");
        assert_eq!(config.service.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.service.sweep_default_limit, 25);
    }

    #[test]
    fn zero_interval_disables_scheduler() {
        let config = Config::from_lookup(lookup(&[("SWEEP_INTERVAL_SECS", "0")]));
        assert!(config.sweep_interval.is_none());
    }
}
