//! redb table definitions for the FleetGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Shape shared by every table in the store.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Infrastructure records keyed by `{infrastructure_id}`.
pub const INFRASTRUCTURES: JsonTable = TableDefinition::new("infrastructures");

/// Host records keyed by `{host_id}`.
pub const HOSTS: JsonTable = TableDefinition::new("hosts");

/// Application records keyed by `{application_id}`.
pub const APPLICATIONS: JsonTable = TableDefinition::new("applications");

/// Workload records keyed by `{workload_id}`.
pub const WORKLOADS: JsonTable = TableDefinition::new("workloads");

/// Subnet allocations keyed by `{network_id}`.
pub const SUBNETS: JsonTable = TableDefinition::new("subnets");

/// Allocation cursors keyed by `{pool_cidr}`.
pub const SUBNET_CURSORS: JsonTable = TableDefinition::new("subnet_cursors");
