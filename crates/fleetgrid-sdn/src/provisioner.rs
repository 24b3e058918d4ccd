//! Network provisioning capability and location scanning.
//!
//! A [`NetworkProvisioner`] creates and destroys the data-plane resources of
//! a virtual network. Networks find one either from their SDN provider or
//! from the first [`Location`] that exposes the capability.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fleetgrid_core::Cidr;
use tracing::debug;

use crate::network::VirtualNetwork;

/// Creates and tears down a virtual network's data plane.
#[async_trait]
pub trait NetworkProvisioner: Send + Sync {
    async fn provision_network(&self, network: &VirtualNetwork) -> anyhow::Result<()>;

    async fn deallocate_network(&self, network: &VirtualNetwork) -> anyhow::Result<()>;
}

// ── Locations ──────────────────────────────────────────────────────

/// A place networks can be started in, optionally exposing a provisioner.
#[derive(Clone)]
pub struct Location {
    name: String,
    network_provisioner: Option<Arc<dyn NetworkProvisioner>>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_provisioner: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn NetworkProvisioner>) -> Self {
        self.network_provisioner = Some(provisioner);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network_provisioner(&self) -> Option<Arc<dyn NetworkProvisioner>> {
        self.network_provisioner.clone()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("name", &self.name)
            .field("provisioner", &self.network_provisioner.is_some())
            .finish()
    }
}

/// The provisioner of the first location that has one.
pub fn find_network_provisioner(locations: &[Location]) -> Option<Arc<dyn NetworkProvisioner>> {
    locations.iter().find_map(|l| {
        let found = l.network_provisioner();
        if found.is_some() {
            debug!(location = %l.name, "network provisioner found");
        }
        found
    })
}

// ── In-memory provisioner ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    Provisioned(String),
    Deallocated(String),
}

#[derive(Default)]
struct Ledger {
    active: BTreeMap<String, Cidr>,
    flags: BTreeMap<String, BTreeMap<String, String>>,
    events: Vec<ProvisionEvent>,
}

/// Keeps provisioned networks in memory without touching any data plane.
/// Used for dry runs and tests.
#[derive(Default)]
pub struct InMemoryProvisioner {
    ledger: Mutex<Ledger>,
    delay: Duration,
    delays: BTreeMap<String, Duration>,
    failure: Option<String>,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `delay` to provision each network.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Take `delay` to provision `network_id`, overriding the default delay.
    pub fn with_delay_for(mut self, network_id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(network_id.into(), delay);
        self
    }

    /// Fail every provisioning call with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Currently provisioned networks and their CIDRs.
    pub fn active(&self) -> BTreeMap<String, Cidr> {
        self.ledger().active.clone()
    }

    /// Flags a provisioned network was created with.
    pub fn flags(&self, network_id: &str) -> Option<BTreeMap<String, String>> {
        self.ledger().flags.get(network_id).cloned()
    }

    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.ledger().events.clone()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NetworkProvisioner for InMemoryProvisioner {
    async fn provision_network(&self, network: &VirtualNetwork) -> anyhow::Result<()> {
        let delay = self
            .delays
            .get(network.network_id())
            .copied()
            .unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        let id = network.network_id().to_string();
        debug!(
            network_id = %id,
            cidr = %network.cidr(),
            flags = ?network.spec().flags,
            "network provisioned"
        );
        let mut ledger = self.ledger();
        ledger.active.insert(id.clone(), network.cidr());
        ledger.flags.insert(id, network.spec().flags.clone());
        ledger
            .events
            .push(ProvisionEvent::Provisioned(network.network_id().to_string()));
        Ok(())
    }

    async fn deallocate_network(&self, network: &VirtualNetwork) -> anyhow::Result<()> {
        let mut ledger = self.ledger();
        ledger.active.remove(network.network_id());
        ledger.flags.remove(network.network_id());
        ledger
            .events
            .push(ProvisionEvent::Deallocated(network.network_id().to_string()));
        Ok(())
    }
}
