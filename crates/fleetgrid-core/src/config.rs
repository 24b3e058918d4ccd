//! fleet.toml configuration parser.
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cidr::Cidr;

/// Default per-host container cap when nothing else is configured.
pub const DEFAULT_MAX_CONTAINERS: u32 = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub placement: PlacementConfig,
    pub headroom: HeadroomConfig,
    pub sdn: SdnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Strategy short names, applied in order.
    pub strategies: Vec<String>,
    /// Per-host container cap for the capacity strategies.
    pub max_containers: Option<u32>,
    /// Infrastructure-wide affinity rules, newline or comma separated.
    pub affinity_rules: Option<String>,
    /// Labels a host must carry for the label strategy.
    pub labels: Vec<String>,
    /// CPU usage ceiling (0.0–1.0) for the cpu-usage strategy.
    pub max_cpu: f64,
    /// Regex a host name must match in full for the hostname strategy.
    pub hostname_pattern: Option<String>,
    /// Group strategy: refuse hosts running other applications' workloads.
    pub group_exclusive: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            strategies: vec!["affinity".to_string()],
            max_containers: None,
            affinity_rules: None,
            labels: Vec::new(),
            max_cpu: 0.5,
            hostname_pattern: None,
            group_exclusive: false,
        }
    }
}

/// Exactly one of `count` / `percent` must be set before a headroom
/// policy can be built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadroomConfig {
    /// Free containers the pool must keep available.
    pub count: Option<u32>,
    /// Free containers as a fraction of possible containers.
    pub percent: Option<f64>,
    /// Global per-host cap, used when the placement section sets none.
    pub max_containers: Option<u32>,
    /// Emit COLD when the pool has more than a host's worth of spare capacity.
    pub emit_cold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdnConfig {
    pub pool_cidr: Cidr,
    pub subnet_prefix: u8,
    pub agent_cidr: Option<Cidr>,
    pub ready_timeout_secs: u64,
    pub ready_poll_secs: u64,
    pub drain_timeout_secs: u64,
}

impl Default for SdnConfig {
    fn default() -> Self {
        Self {
            pool_cidr: Cidr::LINK_LOCAL,
            subnet_prefix: 24,
            agent_cidr: None,
            ready_timeout_secs: 60,
            ready_poll_secs: 10,
            drain_timeout_secs: 300,
        }
    }
}

impl SdnConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ready_poll_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, else fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
