//! Application configuration, loaded from an optional TOML file and the environment.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer, de::Error as _};
use std::time::Duration;

use crate::audit::retention;

/// Optional config file read from the working directory.
pub const CONFIG_FILE: &str = "blog-admin.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Grace period for in-flight requests on shutdown, e.g. `8s`.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    /// Enables the periodic retention sweep when set.
    #[serde(default)]
    pub audit_retain_days: Option<i64>,
    /// Time between retention sweeps, e.g. `1d`.
    #[serde(
        default = "default_audit_sweep_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub audit_sweep_interval: Duration,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_db_max_connections() -> u32 {
    4
}

fn default_audit_sweep_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Text(String),
}

/// Accepts bare seconds or a humanized duration such as `90s`, `5m` or `1d`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationValue::Text(text) => fundu::parse_duration(text.trim())
            .map_err(|e| D::Error::custom(format!("invalid duration {text:?}: {e}"))),
    }
}

impl Config {
    /// The file provides defaults; environment variables win.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(days) = self.audit_retain_days
            && let Err(e) = retention::cutoff(days, Utc::now())
        {
            bail!("Invalid AUDIT_RETAIN_DAYS: {e}");
        }
        if self.audit_sweep_interval.is_zero() {
            bail!("AUDIT_SWEEP_INTERVAL must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn defaults_apply() {
        let config = from_toml(r#"database_url = "postgres://localhost/blog""#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(8));
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.audit_retain_days, None);
        assert_eq!(config.audit_sweep_interval, Duration::from_secs(86400));
    }

    #[test]
    fn retention_below_floor_is_rejected() {
        let err = from_toml(
            r#"
            database_url = "postgres://localhost/blog"
            audit_retain_days = 3
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("AUDIT_RETAIN_DAYS"));
    }

    #[test]
    fn retention_beyond_representable_time_is_rejected() {
        let err = from_toml(
            r#"
            database_url = "postgres://localhost/blog"
            audit_retain_days = 1000000000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("AUDIT_RETAIN_DAYS"));
    }

    #[test]
    fn durations_accept_seconds_or_humanized_text() {
        let config = from_toml(
            r#"
            database_url = "postgres://localhost/blog"
            shutdown_timeout = 15
            audit_sweep_interval = "6h"
            "#,
        )
        .unwrap();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(15));
        assert_eq!(config.audit_sweep_interval, Duration::from_secs(6 * 60 * 60));

        let err = from_toml(
            r#"
            database_url = "postgres://localhost/blog"
            shutdown_timeout = "soon"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err = from_toml(
            r#"
            database_url = "postgres://localhost/blog"
            audit_sweep_interval = "0s"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("AUDIT_SWEEP_INTERVAL"));
    }

    #[test]
    fn database_url_is_required() {
        assert!(from_toml("port = 9000").is_err());
    }
}
