//! Conversions from state store records to placement inputs.
//!
//! Bridges `fleetgrid_state::{HostInfo, WorkloadSpec}` to the strategies'
//! [`HostView`], resolving inherited rules and caps along the way.

use std::collections::HashMap;

use fleetgrid_state::{HostInfo, InfrastructureInfo, StateStore, WorkloadSpec};

use crate::error::{PlacementError, PlacementResult};
use crate::strategy::HostView;

/// Build a [`HostView`] from a host, the workloads deployed on it, and its
/// infrastructure (if any).
pub fn host_to_view(
    host: &HostInfo,
    deployed: Vec<WorkloadSpec>,
    infrastructure: Option<&InfrastructureInfo>,
) -> HostView {
    let mut view = HostView::new(host.clone());
    view.deployed = deployed;
    if let Some(infra) = infrastructure {
        view.infrastructure_rules = infra.affinity_rules.clone();
        view.max_containers = host.max_containers.or(infra.max_containers);
    }
    view
}

/// Build views for every host in the store.
pub fn host_views(store: &StateStore) -> PlacementResult<Vec<HostView>> {
    let infrastructures: HashMap<String, InfrastructureInfo> = store
        .list_infrastructures()?
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

    let mut by_host: HashMap<String, Vec<WorkloadSpec>> = HashMap::new();
    for workload in store.list_workloads()? {
        if let Some(host_id) = workload.host_id.clone() {
            by_host.entry(host_id).or_default().push(workload);
        }
    }

    let views = store
        .list_hosts()?
        .iter()
        .map(|host| {
            let deployed = by_host.remove(&host.id).unwrap_or_default();
            let infra = host
                .infrastructure_id
                .as_ref()
                .and_then(|id| infrastructures.get(id));
            host_to_view(host, deployed, infra)
        })
        .collect();
    Ok(views)
}

/// Load a workload for placement, appending its application's rules to
/// its own.
pub fn workload_for_placement(store: &StateStore, workload_id: &str) -> PlacementResult<WorkloadSpec> {
    let mut workload = store
        .get_workload(workload_id)?
        .ok_or_else(|| PlacementError::NotFound(format!("workload {workload_id}")))?;
    if let Some(app) = store.get_application(&workload.application_id)? {
        workload.affinity_rules.extend(app.affinity_rules);
    }
    Ok(workload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgrid_state::ApplicationInfo;

    fn host(id: &str, infra: Option<&str>) -> HostInfo {
        HostInfo {
            id: id.to_string(),
            name: id.to_string(),
            address: "10.0.0.1".to_string(),
            infrastructure_id: infra.map(str::to_string),
            labels: Vec::new(),
            affinity_rules: vec!["NOT NAME legacy".to_string()],
            max_containers: None,
            cpu_usage: 0.2,
            last_seen: 0,
        }
    }

    fn workload(id: &str, host: Option<&str>) -> WorkloadSpec {
        WorkloadSpec {
            id: id.to_string(),
            name: id.to_string(),
            type_name: "x.A".to_string(),
            application_id: "app-1".to_string(),
            parent_id: None,
            host_id: host.map(str::to_string),
            affinity_rules: vec!["NOT TYPE".to_string()],
            attached_networks: Vec::new(),
        }
    }

    #[test]
    fn views_resolve_infrastructure_and_deployments() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_infrastructure(&InfrastructureInfo {
                id: "infra".to_string(),
                name: "docker".to_string(),
                affinity_rules: vec!["SAME APPLICATION".to_string()],
                max_containers: Some(4),
            })
            .unwrap();
        store.put_host(&host("h1", Some("infra"))).unwrap();
        store.put_host(&host("h2", None)).unwrap();
        store.put_workload(&workload("w1", Some("h1"))).unwrap();
        store.put_workload(&workload("w2", Some("h1"))).unwrap();
        store.put_workload(&workload("w3", None)).unwrap();

        let views = host_views(&store).unwrap();
        let h1 = views.iter().find(|v| v.id() == "h1").unwrap();
        let h2 = views.iter().find(|v| v.id() == "h2").unwrap();

        assert_eq!(h1.deployed_count(), 2);
        assert_eq!(h1.infrastructure_rules, vec!["SAME APPLICATION".to_string()]);
        assert_eq!(h1.max_containers, Some(4));
        assert_eq!(h2.deployed_count(), 0);
        assert!(h2.infrastructure_rules.is_empty());
        assert_eq!(h2.max_containers, None);
    }

    #[test]
    fn host_cap_overrides_infrastructure() {
        let mut h = host("h", Some("infra"));
        h.max_containers = Some(2);
        let infra = InfrastructureInfo {
            id: "infra".to_string(),
            name: "docker".to_string(),
            affinity_rules: Vec::new(),
            max_containers: Some(6),
        };
        let view = host_to_view(&h, Vec::new(), Some(&infra));
        assert_eq!(view.max_containers, Some(2));
    }

    #[test]
    fn workload_inherits_application_rules() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_application(&ApplicationInfo {
                id: "app-1".to_string(),
                name: "shop".to_string(),
                affinity_rules: vec!["NOT EMPTY".to_string()],
            })
            .unwrap();
        store.put_workload(&workload("w1", None)).unwrap();

        let w = workload_for_placement(&store, "w1").unwrap();
        assert_eq!(w.affinity_rules, vec!["NOT TYPE".to_string(), "NOT EMPTY".to_string()]);
    }

    #[test]
    fn missing_workload_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = workload_for_placement(&store, "ghost").unwrap_err();
        assert!(matches!(err, PlacementError::NotFound(_)));
    }
}
