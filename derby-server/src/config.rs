//! Server configuration from `DERBY_*` environment variables

use anyhow::{Context, Result};
use derby_backends::{EngineProfile, InMemoryBackend};
use std::net::SocketAddr;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Chance that a drive breaks down
    pub breakdown_chance: f64,
    /// Start with the sample cars
    pub seed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            breakdown_chance: 0.0,
            seed: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a key lookup; a present but malformed value is an error
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("DERBY_ADDR") {
            config.addr = addr
                .parse()
                .with_context(|| format!("DERBY_ADDR is not a socket address: {}", addr))?;
        }
        if let Some(chance) = lookup("DERBY_BREAKDOWN_CHANCE") {
            let chance: f64 = chance
                .parse()
                .with_context(|| format!("DERBY_BREAKDOWN_CHANCE is not a number: {}", chance))?;
            anyhow::ensure!(
                (0.0..=1.0).contains(&chance),
                "DERBY_BREAKDOWN_CHANCE must be within [0, 1], got {}",
                chance
            );
            config.breakdown_chance = chance;
        }
        if let Some(seed) = lookup("DERBY_SEED") {
            config.seed = match seed.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => anyhow::bail!("DERBY_SEED must be a boolean, got {}", other),
            };
        }

        Ok(config)
    }

    pub fn backend(&self) -> InMemoryBackend {
        let profile = EngineProfile::default().with_breakdown_chance(self.breakdown_chance);
        let backend = InMemoryBackend::new().with_profile(profile);
        if self.seed {
            backend.with_cars(derby_backends::memory::sample_cars())
        } else {
            backend
        }
    }
}
