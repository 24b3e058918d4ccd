//! SDN provider: subnet allocation and address management.
//!
//! The provider owns the id → CIDR ledger for one pool and the registry of
//! virtual networks created from it. Allocation is serialized by a single
//! async mutex; provisioning and readiness waits happen after it is
//! released, so networks for different ids come up in parallel.
//!
//! # Allocation
//!
//! ```text
//! lock
//!   network = registry[id]
//!   if none:
//!       cidr = ledger[id] or subnet_at(pool, prefix, allocated++)
//!       registry[id] = VirtualNetwork(id, cidr)
//! unlock
//! created here   → network.start()
//! created before → wait until it is up (bounded)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use fleetgrid_core::{Cidr, SdnConfig, subnet_at};
use fleetgrid_state::{NetworkId, StateStore, SubnetAllocation, SubnetCursor};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{SdnError, SdnResult};
use crate::network::{NetworkSpec, NetworkStatus, VirtualNetwork};
use crate::provisioner::{Location, NetworkProvisioner};
use crate::wait::repeat_until;

/// Subnet bookkeeping guarded by the network mutex.
#[derive(Debug, Default)]
struct SubnetLedger {
    /// Next sequential pool index.
    allocated: u64,
    subnets: BTreeMap<NetworkId, Cidr>,
}

/// Address bookkeeping guarded by the address mutex.
#[derive(Debug, Default)]
struct AddressLedger {
    agents_allocated: u64,
    by_subnet: HashMap<NetworkId, Vec<Ipv4Addr>>,
    by_container: HashMap<String, Vec<Ipv4Addr>>,
}

/// Allocates subnets from a pool and manages the networks built on them.
pub struct SdnProvider {
    config: SdnConfig,
    subnets: Mutex<SubnetLedger>,
    addresses: std::sync::Mutex<AddressLedger>,
    networks: RwLock<HashMap<NetworkId, Arc<VirtualNetwork>>>,
    provisioner: Option<Arc<dyn NetworkProvisioner>>,
    locations: Vec<Location>,
    store: Option<StateStore>,
}

impl SdnProvider {
    pub fn new(config: SdnConfig) -> Self {
        Self {
            config,
            subnets: Mutex::new(SubnetLedger::default()),
            addresses: std::sync::Mutex::new(AddressLedger::default()),
            networks: RwLock::new(HashMap::new()),
            provisioner: None,
            locations: Vec::new(),
            store: None,
        }
    }

    /// Persist allocations to `store`, restoring any recorded there.
    ///
    /// Restored ids keep their CIDR and sequential allocation resumes after
    /// the highest index ever handed out, anonymous ones included.
    pub fn with_store(mut self, store: StateStore) -> SdnResult<Self> {
        let restored = store.list_subnets()?;
        let cursor = store.get_subnet_cursor(&self.config.pool_cidr)?;
        let ledger = self.subnets.get_mut();
        if let Some(cursor) = cursor {
            ledger.allocated = cursor.next_index;
        }
        for allocation in &restored {
            ledger
                .subnets
                .insert(allocation.network_id.clone(), allocation.cidr);
            if let Some(index) = allocation.index {
                ledger.allocated = ledger.allocated.max(index + 1);
            }
        }
        info!(
            restored = restored.len(),
            next_index = ledger.allocated,
            "subnet allocations restored"
        );
        self.store = Some(store);
        Ok(self)
    }

    /// Provisioner handed to every network this provider creates.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn NetworkProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Locations scanned for a provisioner when none is configured.
    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    pub fn config(&self) -> &SdnConfig {
        &self.config
    }

    // ── Subnet ledger ──────────────────────────────────────────────

    fn compute_subnet(&self, index: u64) -> SdnResult<Cidr> {
        let index = i64::try_from(index)
            .map_err(|_| SdnError::Configuration(format!("subnet index {index} overflows")))?;
        let cidr = subnet_at(&self.config.pool_cidr, self.config.subnet_prefix, index)?;
        if !self.config.pool_cidr.contains(cidr.address()) {
            warn!(%cidr, pool = %self.config.pool_cidr, index, "subnet lies outside the pool");
        }
        Ok(cidr)
    }

    fn persist(&self, network_id: &str, cidr: Cidr, index: Option<u64>) -> SdnResult<()> {
        if let Some(store) = &self.store {
            store.put_subnet(&SubnetAllocation {
                network_id: network_id.to_string(),
                cidr,
                index,
                allocated_at: epoch_secs(),
            })?;
        }
        Ok(())
    }

    /// Consume the next pool index. Caller holds the lock.
    fn advance_locked(&self, ledger: &mut SubnetLedger) -> SdnResult<(u64, Cidr)> {
        let index = ledger.allocated;
        let cidr = self.compute_subnet(index)?;
        if let Some(store) = &self.store {
            store.put_subnet_cursor(&SubnetCursor {
                pool: self.config.pool_cidr,
                next_index: index + 1,
            })?;
        }
        ledger.allocated = index + 1;
        Ok((index, cidr))
    }

    /// Assign the next pool subnet to `network_id`. Caller holds the lock.
    fn allocate_locked(&self, ledger: &mut SubnetLedger, network_id: &str) -> SdnResult<Cidr> {
        let (index, cidr) = self.advance_locked(ledger)?;
        self.persist(network_id, cidr, Some(index))?;
        ledger.subnets.insert(network_id.to_string(), cidr);
        debug!(network_id, %cidr, index, "subnet allocated");
        Ok(cidr)
    }

    /// Assign an explicit CIDR to `network_id`. Caller holds the lock.
    fn record_locked(
        &self,
        ledger: &mut SubnetLedger,
        network_id: &str,
        cidr: Cidr,
    ) -> SdnResult<()> {
        match ledger.subnets.get(network_id) {
            Some(existing) if *existing == cidr => Ok(()),
            Some(existing) => Err(SdnError::Configuration(format!(
                "network {network_id} already holds {existing}, cannot record {cidr}"
            ))),
            None => {
                self.persist(network_id, cidr, None)?;
                ledger.subnets.insert(network_id.to_string(), cidr);
                debug!(network_id, %cidr, "subnet recorded");
                Ok(())
            }
        }
    }

    /// Take the next pool subnet without assigning it to a network. The
    /// block is never handed out again, across restarts too.
    pub async fn next_subnet_cidr(&self) -> SdnResult<Cidr> {
        let mut ledger = self.subnets.lock().await;
        let (index, cidr) = self.advance_locked(&mut ledger)?;
        debug!(%cidr, index, "anonymous subnet allocated");
        Ok(cidr)
    }

    /// Assign the next pool subnet to `network_id`, or return the one it
    /// already has.
    pub async fn next_subnet_cidr_for(&self, network_id: &str) -> SdnResult<Cidr> {
        let mut ledger = self.subnets.lock().await;
        if let Some(cidr) = ledger.subnets.get(network_id) {
            return Ok(*cidr);
        }
        self.allocate_locked(&mut ledger, network_id)
    }

    /// Record an explicitly chosen CIDR for `network_id`.
    ///
    /// Fails if the id already holds a different CIDR.
    pub async fn record_subnet_cidr(&self, network_id: &str, cidr: Cidr) -> SdnResult<()> {
        let mut ledger = self.subnets.lock().await;
        self.record_locked(&mut ledger, network_id, cidr)
    }

    pub async fn subnet_cidr(&self, network_id: &str) -> Option<Cidr> {
        self.subnets.lock().await.subnets.get(network_id).copied()
    }

    /// Every network id and its CIDR.
    pub async fn list_managed_network_address_space(&self) -> BTreeMap<NetworkId, Cidr> {
        self.subnets.lock().await.subnets.clone()
    }

    // ── Networks ───────────────────────────────────────────────────

    /// Make sure a network exists and is up for `network_id`, returning its
    /// CIDR. Concurrent calls for the same id get the same CIDR and only
    /// one of them provisions.
    pub async fn ensure_network(&self, network_id: &str) -> SdnResult<Cidr> {
        let network = self.create_network(NetworkSpec::new(network_id)).await?;
        Ok(network.cidr())
    }

    /// Like [`ensure_network`](Self::ensure_network), honouring an explicit
    /// CIDR in `spec`.
    pub async fn create_network(&self, spec: NetworkSpec) -> SdnResult<Arc<VirtualNetwork>> {
        let network_id = spec.network_id.clone();
        let (network, created) = {
            let mut ledger = self.subnets.lock().await;
            let mut networks = self.networks.write().await;
            match networks.get(&network_id) {
                Some(existing) => {
                    if let Some(explicit) = spec.cidr
                        && explicit != existing.cidr()
                    {
                        return Err(SdnError::Configuration(format!(
                            "network {network_id} already holds {}, cannot create with {explicit}",
                            existing.cidr()
                        )));
                    }
                    (existing.clone(), false)
                }
                None => {
                    let cidr = match (spec.cidr, ledger.subnets.get(&network_id).copied()) {
                        (Some(explicit), _) => {
                            self.record_locked(&mut ledger, &network_id, explicit)?;
                            explicit
                        }
                        (None, Some(known)) => known,
                        (None, None) => self.allocate_locked(&mut ledger, &network_id)?,
                    };
                    let network = Arc::new(
                        VirtualNetwork::new(spec, cidr, self.config.drain_timeout())
                            .with_provisioner(self.provisioner.clone()),
                    );
                    networks.insert(network_id.clone(), network.clone());
                    (network, true)
                }
            }
        };

        if created {
            if let Err(e) = network.start(&self.locations).await {
                self.forget(&network_id, &network).await;
                return Err(e);
            }
        } else {
            self.wait_until_up(&network).await?;
        }
        Ok(network)
    }

    /// Remove `network` from the registry if it is still the current entry.
    async fn forget(&self, network_id: &str, network: &Arc<VirtualNetwork>) {
        let mut networks = self.networks.write().await;
        if networks
            .get(network_id)
            .is_some_and(|current| Arc::ptr_eq(current, network))
        {
            networks.remove(network_id);
        }
    }

    /// Poll an existing network until it leaves `Created`/`Starting`.
    async fn wait_until_up(&self, network: &VirtualNetwork) -> SdnResult<()> {
        let timeout = self.config.ready_timeout();
        let settled = repeat_until(self.config.ready_poll_interval(), timeout, move || async move {
            !matches!(
                network.status(),
                NetworkStatus::Created | NetworkStatus::Starting
            )
        })
        .await;

        if !settled {
            return Err(SdnError::Timeout {
                what: format!("network {} to become ready", network.network_id()),
                after: timeout,
            });
        }
        match network.status() {
            NetworkStatus::Up => Ok(()),
            NetworkStatus::Failed => Err(SdnError::Provisioning(format!(
                "network {} failed to start",
                network.network_id()
            ))),
            other => Err(SdnError::InvalidState(format!(
                "network {} is {other}",
                network.network_id()
            ))),
        }
    }

    pub async fn network(&self, network_id: &str) -> Option<Arc<VirtualNetwork>> {
        self.networks.read().await.get(network_id).cloned()
    }

    pub async fn list_networks(&self) -> Vec<Arc<VirtualNetwork>> {
        self.networks.read().await.values().cloned().collect()
    }

    async fn require_network(&self, network_id: &str) -> SdnResult<Arc<VirtualNetwork>> {
        self.network(network_id)
            .await
            .ok_or_else(|| SdnError::InvalidState(format!("no network {network_id}")))
    }

    /// Connect a workload to a network.
    pub async fn attach(&self, network_id: &str, workload_id: &str) -> SdnResult<()> {
        self.require_network(network_id).await?.attach(workload_id)
    }

    /// Disconnect a workload. Returns true if it was attached.
    pub async fn detach(&self, network_id: &str, workload_id: &str) -> SdnResult<bool> {
        Ok(self.require_network(network_id).await?.detach(workload_id))
    }

    /// Drain and deallocate a network, then drop it from the registry.
    /// Its CIDR stays assigned to the id.
    pub async fn stop_network(&self, network_id: &str) -> SdnResult<()> {
        let network = self.require_network(network_id).await?;
        let result = network.stop().await;
        self.forget(network_id, &network).await;
        result
    }

    // ── Addresses ──────────────────────────────────────────────────

    fn address_ledger(&self) -> std::sync::MutexGuard<'_, AddressLedger> {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next address for an SDN agent, from the configured agent CIDR.
    pub fn next_agent_address(&self, agent_id: &str) -> SdnResult<Ipv4Addr> {
        let agent_cidr = self
            .config
            .agent_cidr
            .ok_or_else(|| SdnError::Configuration("no agent CIDR configured".to_string()))?;
        let mut ledger = self.address_ledger();
        let offset = ledger.agents_allocated + 1;
        if offset >= agent_cidr.size() {
            return Err(SdnError::AddressExhausted(agent_cidr.to_string()));
        }
        let address = agent_cidr.address_at_offset(offset)?;
        ledger.agents_allocated = offset;
        debug!(agent_id, %address, "agent address allocated");
        Ok(address)
    }

    /// First unused host address in a network's subnet.
    pub async fn next_container_address(&self, network_id: &str) -> SdnResult<Ipv4Addr> {
        let cidr = self
            .subnet_cidr(network_id)
            .await
            .ok_or_else(|| SdnError::InvalidState(format!("no subnet for {network_id}")))?;

        let mut ledger = self.address_ledger();
        let used = ledger.by_subnet.entry(network_id.to_string()).or_default();
        // Offset 0 is the network address and the last is broadcast.
        for offset in 1..cidr.size().saturating_sub(1) {
            let address = cidr.address_at_offset(offset)?;
            if !used.contains(&address) {
                used.push(address);
                debug!(network_id, %address, "container address allocated");
                return Ok(address);
            }
        }
        Err(SdnError::AddressExhausted(format!("{network_id} ({cidr})")))
    }

    /// Mark an address in a network's subnet as taken.
    pub fn record_container_address(&self, network_id: &str, address: Ipv4Addr) {
        let mut ledger = self.address_ledger();
        let used = ledger.by_subnet.entry(network_id.to_string()).or_default();
        if !used.contains(&address) {
            used.push(address);
        }
    }

    /// Remember that `container_id` holds `address`.
    pub fn associate_container_address(&self, container_id: &str, address: Ipv4Addr) {
        let mut ledger = self.address_ledger();
        let held = ledger.by_container.entry(container_id.to_string()).or_default();
        if !held.contains(&address) {
            held.push(address);
        }
    }

    pub fn container_addresses(&self, container_id: &str) -> Vec<Ipv4Addr> {
        self.address_ledger()
            .by_container
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
