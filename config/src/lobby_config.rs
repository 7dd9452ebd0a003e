use cron::Schedule;
use eyre::{
    eyre,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    str::FromStr,
    time::Duration,
};

/// Upstream directory and crawl settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Klei lobby token, only required for server detail reads.
    #[serde(default)]
    pub token: String,
    pub regions_url: String,
    /// Listing URL template with `{region}` and `{platform}` placeholders.
    pub servers_url: String,
    /// Detail URL template with a `{region}` placeholder.
    pub details_url: String,
    #[serde(with = "crate::duration")]
    pub request_timeout: Duration,
    pub concurrency: usize,
    #[serde(with = "crate::duration")]
    pub collect_timeout: Duration,
    pub collect_cron: String,
    pub clear_cron: String,
    #[serde(with = "crate::duration")]
    pub ttl: Duration,
}

impl LobbyConfig {
    pub fn collect_schedule(&self) -> Result<Schedule> {
        parse_schedule(&self.collect_cron)
    }

    pub fn clear_schedule(&self) -> Result<Schedule> {
        parse_schedule(&self.clear_cron)
    }

    pub fn servers_url_for(&self, region: &str, platform: &str) -> String {
        self.servers_url
            .replace("{region}", region)
            .replace("{platform}", platform)
    }

    pub fn details_url_for(&self, region: &str) -> String {
        self.details_url.replace("{region}", region)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(eyre!("lobby.concurrency must be greater than zero"));
        }
        if self.request_timeout.is_zero() || self.collect_timeout.is_zero() {
            return Err(eyre!("lobby timeouts must be greater than zero"));
        }
        if self.ttl.is_zero() {
            return Err(eyre!("lobby.ttl must be greater than zero"));
        }
        url::Url::parse(&self.regions_url).map_err(|e| eyre!("invalid lobby.regions_url: {e}"))?;
        url::Url::parse(&self.servers_url_for("us-east-1", "Steam"))
            .map_err(|e| eyre!("invalid lobby.servers_url: {e}"))?;
        url::Url::parse(&self.details_url_for("us-east-1")).map_err(|e| eyre!("invalid lobby.details_url: {e}"))?;
        self.collect_schedule()?;
        self.clear_schedule()?;
        Ok(())
    }
}

/// Parses a cron expression, accepting the classic five-field form by
/// pinning the seconds field to zero.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| eyre!("invalid cron expression '{expr}': {e}"))
}
