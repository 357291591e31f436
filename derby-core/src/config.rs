//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const GARAGE_PAGE_SIZE: u32 = 7;
pub const WINNERS_PAGE_SIZE: u32 = 10;
/// ~60Hz display refresh
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_TRACK_LENGTH: f64 = 1000.0;

/// Settings shared by the garage and leaderboard controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerbyConfig {
    /// Base URL of the resource server
    pub api_url: String,
    pub garage_page_size: u32,
    pub winners_page_size: u32,
    pub frame_interval_ms: u64,
    /// Track length used until the first layout measurement
    pub track_length: f64,
}

impl Default for DerbyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            garage_page_size: GARAGE_PAGE_SIZE,
            winners_page_size: WINNERS_PAGE_SIZE,
            frame_interval_ms: FRAME_INTERVAL.as_millis() as u64,
            track_length: DEFAULT_TRACK_LENGTH,
        }
    }
}

impl DerbyConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by `DERBY_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; unparsable values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("DERBY_API_URL") {
            self.api_url = url;
        }
        override_parsed(&lookup, "DERBY_GARAGE_PAGE_SIZE", &mut self.garage_page_size);
        override_parsed(&lookup, "DERBY_WINNERS_PAGE_SIZE", &mut self.winners_page_size);
        override_parsed(&lookup, "DERBY_FRAME_INTERVAL_MS", &mut self.frame_interval_ms);
        override_parsed(&lookup, "DERBY_TRACK_LENGTH", &mut self.track_length);
        self
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring unparsable {}={}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = DerbyConfig::from_json(r#"{"api_url": "http://race:8080"}"#).unwrap();
        assert_eq!(config.api_url, "http://race:8080");
        assert_eq!(config.garage_page_size, 7);
        assert_eq!(config.winners_page_size, 10);
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn overrides_skip_garbage() {
        let env: HashMap<&str, &str> = [
            ("DERBY_GARAGE_PAGE_SIZE", "5"),
            ("DERBY_FRAME_INTERVAL_MS", "fast"),
        ]
        .into_iter()
        .collect();
        let config =
            DerbyConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.garage_page_size, 5);
        assert_eq!(config.frame_interval_ms, 16);
    }
}
