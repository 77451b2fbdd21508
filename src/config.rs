use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use greensteps_core::QuantityLimits;
use jiff::tz::TimeZone;
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) server: ServerConfig,
    pub(crate) store: StoreConfig,
    pub(crate) admin: Option<AdminConfig>,
    pub(crate) leaderboard: LeaderboardConfig,
    pub(crate) limits: QuantityLimits,
    pub(crate) summary: SummaryConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) bind: String,
    pub(crate) http_port: u16,
    /// Header carrying the authenticated user id, set by the auth proxy.
    pub(crate) user_header: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct StoreConfig {
    pub(crate) data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminConfig {
    pub(crate) password: SecretString,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct LeaderboardConfig {
    pub(crate) default_limit: usize,
    pub(crate) max_limit: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct SummaryConfig {
    /// IANA name of the zone used to bucket activities into days.
    pub(crate) time_zone: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: 8080,
            user_header: "x-user-id".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            time_zone: "UTC".to_string(),
        }
    }
}

impl LeaderboardConfig {
    /// Requested limit, or the default, capped at `max_limit`.
    pub(crate) fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl SummaryConfig {
    pub(crate) fn zone(&self) -> Result<TimeZone> {
        if self.time_zone.eq_ignore_ascii_case("UTC") {
            return Ok(TimeZone::UTC);
        }
        TimeZone::get(&self.time_zone)
            .with_context(|| format!("unknown time zone {}", self.time_zone))
    }
}

impl Config {
    pub(crate) fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text)
    }

    pub(crate) fn parse(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text).context("invalid config")?;
        config.summary.zone()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::Config;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.user_header, "x-user-id");
        assert_eq!(config.store.data_dir.to_str(), Some("data"));
        assert!(config.admin.is_none());
        assert_eq!(config.leaderboard.clamp(None), 50);
        assert_eq!(config.limits.max_food_kg, Some(1000.0));
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [server]
            http_port = 9000

            [admin]
            password = "hunter2"

            [leaderboard]
            max_limit = 10

            [limits]
            max_food_kg = 50.0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.admin.unwrap().password.expose_secret(), "hunter2");
        assert_eq!(config.leaderboard.clamp(Some(500)), 10);
        assert_eq!(config.leaderboard.clamp(Some(0)), 1);
        assert_eq!(config.limits.max_food_kg, Some(50.0));
        assert_eq!(config.limits.max_electricity_kwh, Some(10000.0));
    }

    #[test]
    fn bad_time_zone_is_rejected() {
        assert!(Config::parse("[summary]\ntime_zone = \"Mars/Olympus\"").is_err());
    }
}
