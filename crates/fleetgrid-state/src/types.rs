//! Domain types for the FleetGrid state store.
//!
//! These are the read-only views the placement and networking core
//! consumes, plus the subnet ledger it writes. All types are serializable
//! to/from JSON for storage in redb tables.

use fleetgrid_core::Cidr;
use serde::{Deserialize, Serialize};

/// Unique identifier for a container host.
pub type HostId = String;

/// Unique identifier for a workload (container or managed unit).
pub type WorkloadId = String;

/// Unique identifier for the infrastructure owning a set of hosts.
pub type InfrastructureId = String;

/// Unique identifier for an application grouping workloads.
pub type ApplicationId = String;

/// Logical network identifier (usually an application id).
pub type NetworkId = String;

// ── Infrastructure ────────────────────────────────────────────────

/// A pool of hosts managed together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfrastructureInfo {
    pub id: InfrastructureId,
    pub name: String,
    /// Affinity rules inherited by every host in this infrastructure.
    #[serde(default)]
    pub affinity_rules: Vec<String>,
    /// Per-host container cap configured on the infrastructure.
    #[serde(default)]
    pub max_containers: Option<u32>,
}

// ── Host ──────────────────────────────────────────────────────────

/// A machine capable of running containers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostInfo {
    pub id: HostId,
    pub name: String,
    pub address: String,
    pub infrastructure_id: Option<InfrastructureId>,
    /// Tags used by label-constrained placement.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Affinity rules configured on this host.
    #[serde(default)]
    pub affinity_rules: Vec<String>,
    /// Host-level container cap, overrides the infrastructure's.
    #[serde(default)]
    pub max_containers: Option<u32>,
    /// Last observed CPU usage (0.0–1.0).
    #[serde(default)]
    pub cpu_usage: f64,
    /// Unix timestamp of the last inventory refresh.
    pub last_seen: u64,
}

// ── Application ───────────────────────────────────────────────────

/// An application grouping workloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationInfo {
    pub id: ApplicationId,
    pub name: String,
    /// Affinity rules inherited by every workload of this application.
    #[serde(default)]
    pub affinity_rules: Vec<String>,
}

// ── Workload ──────────────────────────────────────────────────────

/// A container being placed, or one already deployed on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSpec {
    pub id: WorkloadId,
    /// Display name.
    pub name: String,
    /// Fully qualified type name, e.g. `org.example.solr.SolrServer`.
    pub type_name: String,
    pub application_id: ApplicationId,
    /// Workload this one is a child of, if any.
    #[serde(default)]
    pub parent_id: Option<WorkloadId>,
    /// Host the workload is deployed on; `None` while being placed.
    #[serde(default)]
    pub host_id: Option<HostId>,
    /// Affinity rules configured on the workload itself.
    #[serde(default)]
    pub affinity_rules: Vec<String>,
    /// Virtual networks the workload is attached to.
    #[serde(default)]
    pub attached_networks: Vec<NetworkId>,
}

impl WorkloadSpec {
    /// The last path segment of the type name (`SolrServer`).
    pub fn simple_type_name(&self) -> &str {
        self.type_name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(&self.type_name)
    }
}

// ── Subnets ───────────────────────────────────────────────────────

/// A CIDR assigned to a logical network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetAllocation {
    pub network_id: NetworkId,
    pub cidr: Cidr,
    /// Sequential pool index, `None` for explicitly recorded CIDRs.
    pub index: Option<u64>,
    /// Unix timestamp of the allocation.
    pub allocated_at: u64,
}

/// High-water mark of sequential allocation in one pool. Covers indices
/// handed out without a network id, which leave no [`SubnetAllocation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetCursor {
    pub pool: Cidr,
    /// First index not yet handed out.
    pub next_index: u64,
}
