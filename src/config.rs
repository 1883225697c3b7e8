//! Runtime configuration, read once from the environment.

use std::env;
use std::time::Duration;

use crate::alert::{DEFAULT_DIAL_DELAY, DEFAULT_FIX_TIMEOUT, PanicSettings, Platform};
use crate::demo::DEFAULT_METRICS_LATENCY;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    /// SQLite URL. Without one the seeded in-memory demo store is used.
    pub database_url: Option<String>,

    pub panic: PanicSettings,

    /// Simulated latency of demo metrics queries.
    pub metrics_latency: Duration,

    /// Endpoint that receives `sms:`/`tel:` URIs. Log-only when unset.
    pub link_webhook: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            panic: PanicSettings::default(),
            metrics_latency: DEFAULT_METRICS_LATENCY,
            link_webhook: None,
        }
    }
}

impl Config {
    /// Load from `BONDGUARD_*` variables, falling back to defaults for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let platform = match lookup("BONDGUARD_PLATFORM").as_deref().map(str::trim) {
            Some("ios") => Platform::Ios,
            _ => Platform::Android,
        };

        Self {
            port: lookup("BONDGUARD_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database_url: non_empty("BONDGUARD_DATABASE_URL"),
            panic: PanicSettings {
                platform,
                sms_recipient: non_empty("BONDGUARD_SMS_TO"),
                dial_delay: parse_u64("BONDGUARD_DIAL_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_DIAL_DELAY),
                fix_timeout: parse_u64("BONDGUARD_FIX_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_FIX_TIMEOUT),
            },
            metrics_latency: parse_u64("BONDGUARD_METRICS_LATENCY_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_METRICS_LATENCY),
            link_webhook: non_empty("BONDGUARD_LINK_WEBHOOK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_url.is_none());
        assert_eq!(config.panic.platform, Platform::Android);
        assert_eq!(config.panic.dial_delay, DEFAULT_DIAL_DELAY);
        assert_eq!(config.panic.fix_timeout, DEFAULT_FIX_TIMEOUT);
        assert_eq!(config.metrics_latency, DEFAULT_METRICS_LATENCY);
        assert!(config.link_webhook.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BONDGUARD_PORT", "8080"),
            ("BONDGUARD_DATABASE_URL", "sqlite:bondguard.db?mode=rwc"),
            ("BONDGUARD_PLATFORM", "ios"),
            ("BONDGUARD_SMS_TO", "+15619990001"),
            ("BONDGUARD_DIAL_DELAY_MS", "1000"),
            ("BONDGUARD_FIX_TIMEOUT_SECS", "30"),
            ("BONDGUARD_LINK_WEBHOOK", "http://relay.local/hook"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:bondguard.db?mode=rwc")
        );
        assert_eq!(config.panic.platform, Platform::Ios);
        assert_eq!(config.panic.sms_recipient.as_deref(), Some("+15619990001"));
        assert_eq!(config.panic.dial_delay, Duration::from_millis(1000));
        assert_eq!(config.panic.fix_timeout, Duration::from_secs(30));
        assert_eq!(
            config.link_webhook.as_deref(),
            Some("http://relay.local/hook")
        );
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("BONDGUARD_PORT", "eighty"),
            ("BONDGUARD_DIAL_DELAY_MS", "-5"),
            ("BONDGUARD_DATABASE_URL", "  "),
        ]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.panic.dial_delay, DEFAULT_DIAL_DELAY);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_zero_metrics_latency_falls_back() {
        let config = config_from(&[("BONDGUARD_METRICS_LATENCY_MS", "0")]);

        assert_eq!(config.metrics_latency, DEFAULT_METRICS_LATENCY);
    }
}
