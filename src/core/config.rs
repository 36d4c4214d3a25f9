//! # Configuration
//!
//! Environment-driven settings, loaded once at startup after `.env` is read.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Add INTERRUPT_POLICY and PURGE_ON_FIRE
//! - 1.0.0: Initial release

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::env;

use crate::features::reminders::InterruptPolicy;

pub const DEFAULT_DATABASE_PATH: &str = "reminders.db";
pub const DEFAULT_TIMEZONE: &str = "Europe/Samara";

#[derive(Debug, Clone)]
pub struct Config {
    /// Only the Discord binary needs this
    pub discord_token: Option<String>,
    pub database_path: String,
    pub timezone: Tz,
    pub log_level: String,
    pub interrupt_policy: InterruptPolicy,
    /// Delete a reminder row as soon as it has been delivered
    pub purge_on_fire: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: None,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            timezone: chrono_tz::Europe::Samara,
            log_level: "info".to_string(),
            interrupt_policy: InterruptPolicy::default(),
            purge_on_fire: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN").filter(|t| !t.trim().is_empty());

        let database_path =
            lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let tz_name = lookup("REMINDER_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow::anyhow!("REMINDER_TIMEZONE: invalid timezone {tz_name:?}: {e}"))?;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let interrupt_policy = match lookup("INTERRUPT_POLICY") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("INTERRUPT_POLICY: {raw:?}"))?,
            None => InterruptPolicy::default(),
        };

        let purge_on_fire = match lookup("PURGE_ON_FIRE") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow::anyhow!("PURGE_ON_FIRE: expected true/false, got {raw:?}"))?,
            None => false,
        };

        Ok(Config {
            discord_token,
            database_path,
            timezone,
            log_level,
            interrupt_policy,
            purge_on_fire,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
