use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::coingecko::{DEFAULT_BASE_URL, MAX_HISTORY_DAYS, MAX_PER_PAGE, MIN_HISTORY_DAYS};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn get_env_bool(key: &str, default: bool) -> bool {
    get_env(key).map(|v| parse_bool(&v)).unwrap_or(default)
}

fn get_env_u32(key: &str, default: u32) -> Result<u32> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u32>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_u16(key: &str, default: u16) -> Result<u16> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u16>()
            .map_err(|e| anyhow!("{key} invalid port: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Upstream
    pub coingecko_base_url: String,
    pub vs_currency: String,
    pub listings_per_page: u32,

    // Dashboard defaults
    pub default_history_days: u32,

    // Server
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coingecko_base_url: DEFAULT_BASE_URL.to_string(),
            vs_currency: "usd".to_string(),
            listings_per_page: 100,
            default_history_days: 30,
            dashboard_host: "127.0.0.1".to_string(),
            dashboard_port: 8000,
            dashboard_open_browser: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Self::default();
        let s = Self {
            coingecko_base_url: get_env_string("COINGECKO_BASE_URL", &d.coingecko_base_url)
                .trim_end_matches('/')
                .to_string(),
            vs_currency: get_env_string("VS_CURRENCY", &d.vs_currency).to_lowercase(),
            listings_per_page: get_env_u32("LISTINGS_PER_PAGE", d.listings_per_page)?,
            default_history_days: get_env_u32("DEFAULT_HISTORY_DAYS", d.default_history_days)?,
            dashboard_host: get_env_string("DASHBOARD_HOST", &d.dashboard_host),
            dashboard_port: get_env_u16("DASHBOARD_PORT", d.dashboard_port)?,
            dashboard_open_browser: get_env_bool("DASHBOARD_OPEN_BROWSER", d.dashboard_open_browser),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn dashboard_url(&self) -> String {
        format!("http://{}:{}/", self.dashboard_host, self.dashboard_port)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.coingecko_base_url.starts_with("http://")
            && !self.coingecko_base_url.starts_with("https://")
        {
            return Err(anyhow!(
                "COINGECKO_BASE_URL must be an http(s) url (got {})",
                self.coingecko_base_url
            ));
        }
        if self.vs_currency.is_empty() || !self.vs_currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("VS_CURRENCY must be alphanumeric (got {})", self.vs_currency));
        }
        if self.listings_per_page < 1 || self.listings_per_page > MAX_PER_PAGE {
            return Err(anyhow!(
                "LISTINGS_PER_PAGE must be in [1, {MAX_PER_PAGE}] (got {})",
                self.listings_per_page
            ));
        }
        if !(MIN_HISTORY_DAYS..=MAX_HISTORY_DAYS).contains(&i64::from(self.default_history_days)) {
            return Err(anyhow!(
                "DEFAULT_HISTORY_DAYS must be in [{MIN_HISTORY_DAYS}, {MAX_HISTORY_DAYS}] (got {})",
                self.default_history_days
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.dashboard_url(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn history_day_bounds_are_inclusive() {
        for days in [1, 365] {
            let s = Settings { default_history_days: days, ..Settings::default() };
            assert!(s.validate().is_ok(), "days={days}");
        }
        assert_eq!((MIN_HISTORY_DAYS, MAX_HISTORY_DAYS), (1_i64, 365_i64));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for v in ["1", "true", "YES", "y", "On"] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "no", "off", "maybe"] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let s = Settings { listings_per_page: 0, ..Settings::default() };
        assert!(s.validate().is_err());

        let s = Settings { listings_per_page: 251, ..Settings::default() };
        assert!(s.validate().is_err());

        let s = Settings { default_history_days: 366, ..Settings::default() };
        assert!(s.validate().is_err());

        let s = Settings { default_history_days: 0, ..Settings::default() };
        assert!(s.validate().is_err());

        let s = Settings { coingecko_base_url: "ftp://example".into(), ..Settings::default() };
        assert!(s.validate().is_err());

        let s = Settings { vs_currency: "us d".into(), ..Settings::default() };
        assert!(s.validate().is_err());
    }
}
