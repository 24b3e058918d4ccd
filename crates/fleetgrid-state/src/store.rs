//! StateStore: redb-backed state persistence for FleetGrid.
//!
//! Provides typed CRUD operations over infrastructures, hosts,
//! applications, workloads, and subnet allocations. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;
use fleetgrid_core::Cidr;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn decode<T: DeserializeOwned>(table: JsonTable, key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        table: table.name().to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [INFRASTRUCTURES, HOSTS, APPLICATIONS, WORKLOADS, SUBNETS, SUBNET_CURSORS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON access ────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let handle = txn.open_table(table).map_err(map_err!(Table))?;
        match handle.get(key).map_err(map_err!(Read))? {
            Some(guard) => decode(table, key, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let handle = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in handle.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(table, key.value(), value.value())?);
        }
        Ok(results)
    }

    fn delete_key(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Infrastructures ────────────────────────────────────────────

    /// Insert or update an infrastructure record.
    pub fn put_infrastructure(&self, infra: &InfrastructureInfo) -> StateResult<()> {
        self.put_json(INFRASTRUCTURES, &infra.id, infra)?;
        debug!(infrastructure = %infra.id, "infrastructure stored");
        Ok(())
    }

    pub fn get_infrastructure(&self, id: &str) -> StateResult<Option<InfrastructureInfo>> {
        self.get_json(INFRASTRUCTURES, id)
    }

    pub fn list_infrastructures(&self) -> StateResult<Vec<InfrastructureInfo>> {
        self.list_json(INFRASTRUCTURES)
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host record.
    pub fn put_host(&self, host: &HostInfo) -> StateResult<()> {
        self.put_json(HOSTS, &host.id, host)?;
        debug!(host = %host.id, "host stored");
        Ok(())
    }

    pub fn get_host(&self, host_id: &str) -> StateResult<Option<HostInfo>> {
        self.get_json(HOSTS, host_id)
    }

    /// List all current hosts.
    pub fn list_hosts(&self) -> StateResult<Vec<HostInfo>> {
        self.list_json(HOSTS)
    }

    /// Delete a host by ID. Returns true if it existed.
    pub fn delete_host(&self, host_id: &str) -> StateResult<bool> {
        let existed = self.delete_key(HOSTS, host_id)?;
        debug!(host = %host_id, existed, "host deleted");
        Ok(existed)
    }

    /// Number of hosts currently in the inventory.
    pub fn host_count(&self) -> StateResult<u32> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let len = table.len().map_err(map_err!(Read))?;
        Ok(len as u32)
    }

    // ── Applications ───────────────────────────────────────────────

    pub fn put_application(&self, app: &ApplicationInfo) -> StateResult<()> {
        self.put_json(APPLICATIONS, &app.id, app)
    }

    pub fn get_application(&self, id: &str) -> StateResult<Option<ApplicationInfo>> {
        self.get_json(APPLICATIONS, id)
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or update a workload record.
    pub fn put_workload(&self, workload: &WorkloadSpec) -> StateResult<()> {
        self.put_json(WORKLOADS, &workload.id, workload)?;
        debug!(workload = %workload.id, host = ?workload.host_id, "workload stored");
        Ok(())
    }

    pub fn get_workload(&self, workload_id: &str) -> StateResult<Option<WorkloadSpec>> {
        self.get_json(WORKLOADS, workload_id)
    }

    pub fn list_workloads(&self) -> StateResult<Vec<WorkloadSpec>> {
        self.list_json(WORKLOADS)
    }

    /// List the workloads currently deployed on a host.
    pub fn list_workloads_for_host(&self, host_id: &str) -> StateResult<Vec<WorkloadSpec>> {
        Ok(self
            .list_workloads()?
            .into_iter()
            .filter(|w| w.host_id.as_deref() == Some(host_id))
            .collect())
    }

    /// Delete a workload by ID. Returns true if it existed.
    pub fn delete_workload(&self, workload_id: &str) -> StateResult<bool> {
        self.delete_key(WORKLOADS, workload_id)
    }

    /// Number of workloads deployed on any host.
    pub fn deployed_count(&self) -> StateResult<u32> {
        let count = self
            .list_workloads()?
            .iter()
            .filter(|w| w.host_id.is_some())
            .count();
        Ok(count as u32)
    }

    // ── Subnets ────────────────────────────────────────────────────

    /// Record a subnet allocation for a network.
    pub fn put_subnet(&self, allocation: &SubnetAllocation) -> StateResult<()> {
        self.put_json(SUBNETS, &allocation.network_id, allocation)?;
        debug!(network_id = %allocation.network_id, cidr = %allocation.cidr, "subnet stored");
        Ok(())
    }

    pub fn get_subnet(&self, network_id: &str) -> StateResult<Option<SubnetAllocation>> {
        self.get_json(SUBNETS, network_id)
    }

    pub fn list_subnets(&self) -> StateResult<Vec<SubnetAllocation>> {
        self.list_json(SUBNETS)
    }

    /// Forget a network's allocation. Returns true if it existed.
    pub fn delete_subnet(&self, network_id: &str) -> StateResult<bool> {
        self.delete_key(SUBNETS, network_id)
    }

    /// Record how far sequential allocation in a pool has advanced.
    pub fn put_subnet_cursor(&self, cursor: &SubnetCursor) -> StateResult<()> {
        self.put_json(SUBNET_CURSORS, &cursor.pool.to_string(), cursor)
    }

    pub fn get_subnet_cursor(&self, pool: &Cidr) -> StateResult<Option<SubnetCursor>> {
        self.get_json(SUBNET_CURSORS, &pool.to_string())
    }
}
