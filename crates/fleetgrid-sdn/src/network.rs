//! Virtual network lifecycle.
//!
//! ```text
//! Created ──start──▶ Starting ──ok──▶ Up ──stop──▶ Draining ──▶ Stopped
//!                        │
//!                        └──error──▶ Failed
//! ```
//!
//! `stop()` waits for every attached workload to detach before the
//! network is deallocated. A drain timeout is reported, but the network
//! is still deallocated and marked `Stopped`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fleetgrid_core::Cidr;
use fleetgrid_state::{NetworkId, WorkloadId};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::{SdnError, SdnResult};
use crate::provisioner::{Location, NetworkProvisioner, find_network_provisioner};
use crate::wait::{WaitOutcome, watch_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Created,
    Starting,
    Up,
    Draining,
    Stopped,
    Failed,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Up => "up",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub network_id: NetworkId,
    /// Explicit CIDR; allocated from the pool when absent.
    #[serde(default)]
    pub cidr: Option<Cidr>,
    /// Free-form options handed to the provisioner.
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

impl NetworkSpec {
    pub fn new(network_id: impl Into<NetworkId>) -> Self {
        Self {
            network_id: network_id.into(),
            ..Self::default()
        }
    }

    pub fn with_cidr(mut self, cidr: Cidr) -> Self {
        self.cidr = Some(cidr);
        self
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }
}

/// One network segment with its assigned CIDR.
pub struct VirtualNetwork {
    spec: NetworkSpec,
    cidr: Cidr,
    /// Provisioner configured by the owning SDN provider, if any.
    provisioner: Option<Arc<dyn NetworkProvisioner>>,
    drain_timeout: Duration,
    status: watch::Sender<NetworkStatus>,
    attached: watch::Sender<BTreeSet<WorkloadId>>,
    /// Provisioner the network came up with. Start and stop run under
    /// this lock so they never interleave.
    active: Mutex<Option<Arc<dyn NetworkProvisioner>>>,
}

impl VirtualNetwork {
    pub fn new(spec: NetworkSpec, cidr: Cidr, drain_timeout: Duration) -> Self {
        let (status, _) = watch::channel(NetworkStatus::Created);
        let (attached, _) = watch::channel(BTreeSet::new());
        Self {
            spec,
            cidr,
            provisioner: None,
            drain_timeout,
            status,
            attached,
            active: Mutex::new(None),
        }
    }

    pub fn with_provisioner(mut self, provisioner: Option<Arc<dyn NetworkProvisioner>>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn network_id(&self) -> &str {
        &self.spec.network_id
    }

    pub fn cidr(&self) -> Cidr {
        self.cidr
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    pub fn service_up(&self) -> bool {
        self.status() == NetworkStatus::Up
    }

    fn set_status(&self, status: NetworkStatus) {
        let previous = self.status.send_replace(status);
        debug!(network_id = %self.network_id(), from = %previous, to = %status, "network status");
    }

    // ── Attachments ────────────────────────────────────────────────

    /// Record a workload as connected. Refused once the network is draining.
    pub fn attach(&self, workload_id: &str) -> SdnResult<()> {
        let status = self.status();
        if matches!(status, NetworkStatus::Draining | NetworkStatus::Stopped | NetworkStatus::Failed) {
            return Err(SdnError::InvalidState(format!(
                "cannot attach {workload_id} to {} network {}",
                status,
                self.network_id()
            )));
        }
        self.attached.send_modify(|set| {
            set.insert(workload_id.to_string());
        });
        Ok(())
    }

    /// Remove a workload. Returns true if it was attached.
    pub fn detach(&self, workload_id: &str) -> bool {
        let mut removed = false;
        self.attached.send_modify(|set| removed = set.remove(workload_id));
        removed
    }

    pub fn attached(&self) -> Vec<WorkloadId> {
        self.attached.borrow().iter().cloned().collect()
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Provision the network, using the configured provisioner or the
    /// first location that offers one.
    pub async fn start(&self, locations: &[Location]) -> SdnResult<()> {
        let mut active = self.active.lock().await;
        let status = self.status();
        if status != NetworkStatus::Created {
            return Err(SdnError::InvalidState(format!(
                "network {} is {status}, expected created",
                self.network_id()
            )));
        }
        self.set_status(NetworkStatus::Starting);

        let Some(provisioner) = self
            .provisioner
            .clone()
            .or_else(|| find_network_provisioner(locations))
        else {
            self.set_status(NetworkStatus::Failed);
            error!(
                network_id = %self.network_id(),
                locations = locations.len(),
                "no network provisioner available"
            );
            return Err(SdnError::Configuration(format!(
                "cannot start network {} in any of {} location(s): no network provisioner",
                self.network_id(),
                locations.len()
            )));
        };

        if let Err(e) = provisioner.provision_network(self).await {
            self.set_status(NetworkStatus::Failed);
            error!(network_id = %self.network_id(), error = %e, "network provisioning failed");
            return Err(SdnError::Provisioning(format!("{}: {e}", self.network_id())));
        }

        *active = Some(provisioner);
        self.set_status(NetworkStatus::Up);
        info!(network_id = %self.network_id(), cidr = %self.cidr, "network provisioned");
        Ok(())
    }

    /// Drain and deallocate the network.
    pub async fn stop(&self) -> SdnResult<()> {
        let mut active = self.active.lock().await;
        match self.status() {
            NetworkStatus::Stopped => return Ok(()),
            NetworkStatus::Up => {}
            other => {
                // Never provisioned, nothing to release.
                debug!(network_id = %self.network_id(), status = %other, "stopping unprovisioned network");
                self.set_status(NetworkStatus::Stopped);
                return Ok(());
            }
        }

        self.set_status(NetworkStatus::Draining);
        let mut attached = self.attached.subscribe();
        let drained = match watch_until(&mut attached, self.drain_timeout, BTreeSet::is_empty).await {
            WaitOutcome::Satisfied => Ok(()),
            WaitOutcome::TimedOut | WaitOutcome::Closed => {
                error!(
                    network_id = %self.network_id(),
                    remaining = ?self.attached(),
                    timeout_secs = self.drain_timeout.as_secs(),
                    "workloads still attached, deallocating anyway"
                );
                Err(SdnError::Timeout {
                    what: format!("workloads to disconnect from {}", self.network_id()),
                    after: self.drain_timeout,
                })
            }
        };

        let released = match active.take() {
            Some(provisioner) => provisioner
                .deallocate_network(self)
                .await
                .map_err(|e| SdnError::Provisioning(format!("{}: {e}", self.network_id()))),
            None => Ok(()),
        };
        match &released {
            Ok(()) => info!(network_id = %self.network_id(), cidr = %self.cidr, "network deallocated"),
            Err(e) => warn!(network_id = %self.network_id(), error = %e, "network deallocation failed"),
        }

        self.set_status(NetworkStatus::Stopped);
        drained.and(released)
    }
}

impl fmt::Debug for VirtualNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualNetwork")
            .field("network_id", &self.spec.network_id)
            .field("cidr", &self.cidr)
            .field("status", &self.status())
            .field("attached", &self.attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::{InMemoryProvisioner, ProvisionEvent};

    fn cidr() -> Cidr {
        "169.254.7.0/24".parse().unwrap()
    }

    fn network(provisioner: &Arc<InMemoryProvisioner>) -> VirtualNetwork {
        VirtualNetwork::new(NetworkSpec::new("app-7"), cidr(), Duration::from_secs(300))
            .with_provisioner(Some(provisioner.clone() as Arc<dyn NetworkProvisioner>))
    }

    #[tokio::test]
    async fn start_provisions_and_goes_up() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = network(&provisioner);
        assert!(!net.service_up());

        net.start(&[]).await.unwrap();

        assert_eq!(net.status(), NetworkStatus::Up);
        assert!(net.service_up());
        assert_eq!(provisioner.active().get("app-7"), Some(&cidr()));
    }

    #[tokio::test]
    async fn start_scans_locations() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = VirtualNetwork::new(NetworkSpec::new("app-7"), cidr(), Duration::from_secs(1));
        let locations = vec![
            Location::new("bare"),
            Location::new("sdn").with_provisioner(provisioner.clone()),
        ];

        net.start(&locations).await.unwrap();
        assert_eq!(provisioner.events(), vec![ProvisionEvent::Provisioned("app-7".to_string())]);
    }

    #[tokio::test]
    async fn start_without_provisioner_fails() {
        let net = VirtualNetwork::new(NetworkSpec::new("app-7"), cidr(), Duration::from_secs(1));
        let err = net.start(&[Location::new("bare")]).await.unwrap_err();

        assert!(matches!(err, SdnError::Configuration(_)));
        assert_eq!(net.status(), NetworkStatus::Failed);
    }

    #[tokio::test]
    async fn provisioning_error_fails_network() {
        let provisioner = Arc::new(InMemoryProvisioner::new().failing("agent unreachable"));
        let net = network(&provisioner);

        let err = net.start(&[]).await.unwrap_err();
        assert!(matches!(err, SdnError::Provisioning(ref m) if m.contains("agent unreachable")));
        assert_eq!(net.status(), NetworkStatus::Failed);

        // Restarting a failed network is refused.
        assert!(matches!(net.start(&[]).await, Err(SdnError::InvalidState(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_detach() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = Arc::new(network(&provisioner));
        net.start(&[]).await.unwrap();
        net.attach("web-1").unwrap();

        let stopping = tokio::spawn({
            let net = net.clone();
            async move { net.stop().await }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(net.status(), NetworkStatus::Draining);
        assert!(provisioner.active().contains_key("app-7"));
        assert!(net.attach("web-2").is_err());

        assert!(net.detach("web-1"));
        stopping.await.unwrap().unwrap();

        assert_eq!(net.status(), NetworkStatus::Stopped);
        assert!(provisioner.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_still_deallocates() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = network(&provisioner);
        net.start(&[]).await.unwrap();
        net.attach("stuck").unwrap();

        let err = net.stop().await.unwrap_err();

        assert!(matches!(err, SdnError::Timeout { after, .. } if after == Duration::from_secs(300)));
        assert_eq!(net.status(), NetworkStatus::Stopped);
        assert!(provisioner.active().is_empty());
    }

    #[tokio::test]
    async fn concurrent_stops_deallocate_once() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = network(&provisioner);
        net.start(&[]).await.unwrap();

        let (a, b) = tokio::join!(net.stop(), net.stop());
        a.unwrap();
        b.unwrap();

        let deallocations = provisioner
            .events()
            .into_iter()
            .filter(|e| matches!(e, ProvisionEvent::Deallocated(_)))
            .count();
        assert_eq!(deallocations, 1);
    }

    #[tokio::test]
    async fn stop_before_start_releases_nothing() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = network(&provisioner);

        net.stop().await.unwrap();

        assert_eq!(net.status(), NetworkStatus::Stopped);
        assert!(provisioner.events().is_empty());
    }

    #[tokio::test]
    async fn status_is_observable() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let net = network(&provisioner);
        let mut rx = net.subscribe_status();
        assert_eq!(*rx.borrow_and_update(), NetworkStatus::Created);

        net.start(&[]).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), NetworkStatus::Up);
    }

    #[test]
    fn spec_builder() {
        let spec = NetworkSpec::new("app-9")
            .with_cidr(cidr())
            .with_flag("encrypt", "true");
        assert_eq!(spec.cidr, Some(cidr()));
        assert_eq!(spec.flags.get("encrypt").map(String::as_str), Some("true"));
    }
}
