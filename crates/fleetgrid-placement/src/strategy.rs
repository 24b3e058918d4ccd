//! Placement strategies: filter and order candidate hosts.
//!
//! Every strategy takes the candidate list produced by the previous one
//! and returns the admissible subset. Filtering strategies preserve the
//! incoming order; ordering strategies (breadth-first, depth-first,
//! least-containers, cpu-usage) sort stably, and random shuffles.

use std::sync::Arc;

use fleetgrid_core::PlacementConfig;
use fleetgrid_core::config::DEFAULT_MAX_CONTAINERS;
use fleetgrid_state::{HostInfo, WorkloadSpec};
use rand::seq::SliceRandom;
use regex::Regex;
use tracing::debug;

use crate::affinity::{AffinityRules, PredicateRegistry};
use crate::error::{PlacementError, PlacementResult};

/// A host as seen by the placement strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct HostView {
    pub host: HostInfo,
    /// Workloads currently deployed on the host.
    pub deployed: Vec<WorkloadSpec>,
    /// Affinity rules inherited from the host's infrastructure.
    pub infrastructure_rules: Vec<String>,
    /// Container cap from the host, else its infrastructure.
    pub max_containers: Option<u32>,
}

impl HostView {
    pub fn new(host: HostInfo) -> Self {
        let max_containers = host.max_containers;
        Self {
            host,
            deployed: Vec::new(),
            infrastructure_rules: Vec::new(),
            max_containers,
        }
    }

    pub fn id(&self) -> &str {
        &self.host.id
    }

    pub fn deployed_count(&self) -> usize {
        self.deployed.len()
    }
}

/// A pluggable host filter.
pub trait PlacementStrategy: Send + Sync {
    /// Short name used in configuration.
    fn name(&self) -> &'static str;

    fn filter_hosts(
        &self,
        hosts: &[HostView],
        workload: &WorkloadSpec,
    ) -> PlacementResult<Vec<HostView>>;
}

// ── Affinity ───────────────────────────────────────────────────────

/// Admits hosts whose deployed workloads all satisfy the combined rules of
/// the workload, the host, and the host's infrastructure.
pub struct AffinityStrategy {
    registry: Arc<PredicateRegistry>,
    /// Extra rules applied to every host.
    rules: Option<String>,
}

impl AffinityStrategy {
    pub fn new(registry: Arc<PredicateRegistry>) -> Self {
        Self {
            registry,
            rules: None,
        }
    }

    pub fn with_rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    fn rules_for(&self, host: &HostView, workload: &WorkloadSpec) -> PlacementResult<AffinityRules> {
        let sources = workload
            .affinity_rules
            .iter()
            .chain(&host.host.affinity_rules)
            .chain(&host.infrastructure_rules)
            .chain(&self.rules);

        let mut rules = AffinityRules::for_workload(workload).with_registry(self.registry.clone());
        for source in sources {
            rules = rules.parse_str(source)?;
        }
        Ok(rules)
    }
}

impl Default for AffinityStrategy {
    fn default() -> Self {
        Self::new(Arc::new(PredicateRegistry::with_builtins()))
    }
}

impl PlacementStrategy for AffinityStrategy {
    fn name(&self) -> &'static str {
        "affinity"
    }

    fn filter_hosts(
        &self,
        hosts: &[HostView],
        workload: &WorkloadSpec,
    ) -> PlacementResult<Vec<HostView>> {
        let mut admitted = Vec::with_capacity(hosts.len());
        for host in hosts {
            let rules = self.rules_for(host, workload)?;
            let accept = if host.deployed.is_empty() {
                rules.allows_empty_hosts()
            } else {
                host.deployed.iter().all(|w| rules.test(w))
            };
            debug!(
                host = %host.id(),
                workload = %workload.id,
                deployed = host.deployed_count(),
                accept,
                "affinity check"
            );
            if accept {
                admitted.push(host.clone());
            }
        }
        Ok(admitted)
    }
}

// ── Capacity ───────────────────────────────────────────────────────

/// Resolve the container cap: strategy config, else host view, else default.
fn effective_cap(configured: Option<u32>, host: &HostView) -> u32 {
    configured
        .or(host.max_containers)
        .unwrap_or(DEFAULT_MAX_CONTAINERS)
}

fn under_cap(configured: Option<u32>, hosts: &[HostView]) -> Vec<HostView> {
    hosts
        .iter()
        .filter(|h| h.deployed_count() < effective_cap(configured, h) as usize)
        .cloned()
        .collect()
}

/// Admits hosts running fewer workloads than their cap.
#[derive(Debug, Default, Clone)]
pub struct MaxContainersStrategy {
    pub max_containers: Option<u32>,
}

impl PlacementStrategy for MaxContainersStrategy {
    fn name(&self) -> &'static str {
        "max-containers"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        Ok(under_cap(self.max_containers, hosts))
    }
}

/// Spreads load: hosts under the cap, emptiest first.
#[derive(Debug, Default, Clone)]
pub struct BreadthFirstStrategy {
    pub max_containers: Option<u32>,
}

impl PlacementStrategy for BreadthFirstStrategy {
    fn name(&self) -> &'static str {
        "breadth-first"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        let mut hosts = under_cap(self.max_containers, hosts);
        hosts.sort_by_key(HostView::deployed_count);
        Ok(hosts)
    }
}

/// Packs load: hosts under the cap, fullest first.
#[derive(Debug, Default, Clone)]
pub struct DepthFirstStrategy {
    pub max_containers: Option<u32>,
}

impl PlacementStrategy for DepthFirstStrategy {
    fn name(&self) -> &'static str {
        "depth-first"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        let mut hosts = under_cap(self.max_containers, hosts);
        hosts.sort_by_key(|h| std::cmp::Reverse(h.deployed_count()));
        Ok(hosts)
    }
}

/// Orders hosts by fewest deployed workloads without filtering.
#[derive(Debug, Default, Clone)]
pub struct LeastContainersStrategy;

impl PlacementStrategy for LeastContainersStrategy {
    fn name(&self) -> &'static str {
        "least-containers"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        let mut hosts = hosts.to_vec();
        hosts.sort_by_key(HostView::deployed_count);
        Ok(hosts)
    }
}

// ── Labels, groups, CPU ────────────────────────────────────────────

/// Admits hosts carrying every required label.
#[derive(Debug, Default, Clone)]
pub struct LabelStrategy {
    pub labels: Vec<String>,
}

impl PlacementStrategy for LabelStrategy {
    fn name(&self) -> &'static str {
        "label"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        Ok(hosts
            .iter()
            .filter(|h| self.labels.iter().all(|l| h.host.labels.contains(l)))
            .cloned()
            .collect())
    }
}

/// Keeps an application's siblings together: a host already running
/// workloads of the same application is admitted only if one of them
/// shares the placing workload's parent.
#[derive(Debug, Default, Clone)]
pub struct GroupStrategy {
    /// Also refuse hosts running workloads of any other application.
    pub exclusive: bool,
}

impl PlacementStrategy for GroupStrategy {
    fn name(&self) -> &'static str {
        "group"
    }

    fn filter_hosts(
        &self,
        hosts: &[HostView],
        workload: &WorkloadSpec,
    ) -> PlacementResult<Vec<HostView>> {
        Ok(hosts
            .iter()
            .filter(|h| {
                let mut same_app = h
                    .deployed
                    .iter()
                    .filter(|d| d.application_id == workload.application_id)
                    .peekable();
                let grouped = same_app.peek().is_none()
                    || same_app.any(|d| d.parent_id == workload.parent_id);
                grouped
                    && (!self.exclusive
                        || h.deployed
                            .iter()
                            .all(|d| d.application_id == workload.application_id))
            })
            .cloned()
            .collect())
    }
}

/// Rejects hosts above a CPU ceiling, least loaded first.
#[derive(Debug, Clone)]
pub struct CpuUsageStrategy {
    pub max_cpu: f64,
}

impl Default for CpuUsageStrategy {
    fn default() -> Self {
        Self { max_cpu: 0.5 }
    }
}

impl PlacementStrategy for CpuUsageStrategy {
    fn name(&self) -> &'static str {
        "cpu-usage"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        let mut hosts: Vec<HostView> = hosts
            .iter()
            .filter(|h| h.host.cpu_usage <= self.max_cpu)
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.host.cpu_usage.total_cmp(&b.host.cpu_usage));
        Ok(hosts)
    }
}

// ── Hostname, random ───────────────────────────────────────────────

/// Admits hosts whose name matches a pattern. The whole name must match.
#[derive(Debug, Clone)]
pub struct HostnameStrategy {
    pattern: Regex,
}

impl HostnameStrategy {
    pub fn new(pattern: &str) -> PlacementResult<Self> {
        let pattern = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            PlacementError::Configuration(format!("invalid hostname pattern {pattern:?}: {e}"))
        })?;
        Ok(Self { pattern })
    }
}

impl PlacementStrategy for HostnameStrategy {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        Ok(hosts
            .iter()
            .filter(|h| {
                let matched = self.pattern.is_match(&h.host.name);
                debug!(host = %h.id(), hostname = %h.host.name, matched, "hostname check");
                matched
            })
            .cloned()
            .collect())
    }
}

/// Shuffles the candidates.
#[derive(Debug, Default, Clone)]
pub struct RandomStrategy;

impl PlacementStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn filter_hosts(&self, hosts: &[HostView], _: &WorkloadSpec) -> PlacementResult<Vec<HostView>> {
        let mut hosts = hosts.to_vec();
        hosts.shuffle(&mut rand::rng());
        Ok(hosts)
    }
}

// ── Chain ──────────────────────────────────────────────────────────

/// Applies strategies in order, each on the previous output.
#[derive(Default)]
pub struct StrategyChain {
    strategies: Vec<Box<dyn PlacementStrategy>>,
}

impl StrategyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl PlacementStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Build a chain from configured strategy names.
    pub fn from_config(
        config: &PlacementConfig,
        registry: Arc<PredicateRegistry>,
    ) -> PlacementResult<Self> {
        let mut chain = Self::new();
        for name in &config.strategies {
            let strategy: Box<dyn PlacementStrategy> = match name.as_str() {
                "affinity" => {
                    let mut s = AffinityStrategy::new(registry.clone());
                    if let Some(rules) = &config.affinity_rules {
                        s = s.with_rules(rules.clone());
                    }
                    Box::new(s)
                }
                "max-containers" => Box::new(MaxContainersStrategy {
                    max_containers: config.max_containers,
                }),
                "breadth-first" => Box::new(BreadthFirstStrategy {
                    max_containers: config.max_containers,
                }),
                "depth-first" => Box::new(DepthFirstStrategy {
                    max_containers: config.max_containers,
                }),
                "least-containers" => Box::new(LeastContainersStrategy),
                "label" => Box::new(LabelStrategy {
                    labels: config.labels.clone(),
                }),
                "group" => Box::new(GroupStrategy {
                    exclusive: config.group_exclusive,
                }),
                "cpu-usage" => Box::new(CpuUsageStrategy {
                    max_cpu: config.max_cpu,
                }),
                "hostname" => {
                    let pattern = config.hostname_pattern.as_deref().ok_or_else(|| {
                        PlacementError::Configuration(
                            "hostname strategy needs hostname_pattern".to_string(),
                        )
                    })?;
                    Box::new(HostnameStrategy::new(pattern)?)
                }
                "random" => Box::new(RandomStrategy),
                other => {
                    return Err(PlacementError::Configuration(format!(
                        "unknown placement strategy {other:?}"
                    )));
                }
            };
            chain.strategies.push(strategy);
        }
        Ok(chain)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl PlacementStrategy for StrategyChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn filter_hosts(
        &self,
        hosts: &[HostView],
        workload: &WorkloadSpec,
    ) -> PlacementResult<Vec<HostView>> {
        let mut current = hosts.to_vec();
        for strategy in &self.strategies {
            current = strategy.filter_hosts(&current, workload)?;
            debug!(
                strategy = strategy.name(),
                remaining = current.len(),
                "strategy applied"
            );
        }
        debug!(
            workload = %workload.id,
            admissible = ?current.iter().map(HostView::id).collect::<Vec<_>>(),
            "placement filtered"
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AffinityError;

    fn host(id: &str) -> HostInfo {
        HostInfo {
            id: id.to_string(),
            name: id.to_string(),
            address: "10.0.0.1".to_string(),
            infrastructure_id: None,
            labels: Vec::new(),
            affinity_rules: Vec::new(),
            max_containers: None,
            cpu_usage: 0.0,
            last_seen: 0,
        }
    }

    fn workload(id: &str, type_name: &str, app: &str) -> WorkloadSpec {
        WorkloadSpec {
            id: id.to_string(),
            name: id.to_string(),
            type_name: type_name.to_string(),
            application_id: app.to_string(),
            parent_id: None,
            host_id: None,
            affinity_rules: Vec::new(),
            attached_networks: Vec::new(),
        }
    }

    fn view(id: &str, deployed: Vec<WorkloadSpec>) -> HostView {
        let mut v = HostView::new(host(id));
        v.deployed = deployed;
        v
    }

    fn ids(hosts: &[HostView]) -> Vec<&str> {
        hosts.iter().map(HostView::id).collect()
    }

    fn placing(rules: &[&str]) -> WorkloadSpec {
        let mut w = workload("new", "db.Postgres", "shop");
        w.affinity_rules = rules.iter().map(|r| r.to_string()).collect();
        w
    }

    // ── Affinity ───────────────────────────────────────────────────

    #[test]
    fn not_type_excludes_hosts_with_same_type() {
        let hosts = vec![
            view("mixed", vec![workload("a", "db.Postgres", "x"), workload("b", "web.Nginx", "x")]),
            view("web", vec![workload("c", "web.Nginx", "x")]),
            view("empty", vec![]),
        ];
        let admitted = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["NOT TYPE"]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["web", "empty"]);
    }

    #[test]
    fn type_requires_all_deployed_to_match() {
        let hosts = vec![
            view("mixed", vec![workload("a", "db.Postgres", "x"), workload("b", "web.Nginx", "x")]),
            view("pg", vec![workload("c", "db.Postgres", "x")]),
        ];
        let admitted = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["TYPE"]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["pg"]);
    }

    #[test]
    fn empty_rules_control_empty_hosts() {
        let hosts = vec![view("empty", vec![]), view("busy", vec![workload("a", "x.A", "x")])];

        let allow = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["EMPTY"]))
            .unwrap();
        assert_eq!(ids(&allow), vec!["empty", "busy"]);

        let deny = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["NOT EMPTY"]))
            .unwrap();
        assert_eq!(ids(&deny), vec!["busy"]);
    }

    #[test]
    fn host_and_infrastructure_rules_combine() {
        let mut h1 = view("h1", vec![workload("a", "web.Nginx", "other")]);
        h1.host.affinity_rules = vec!["SAME APPLICATION".to_string()];
        let mut h2 = view("h2", vec![workload("b", "web.Nginx", "shop")]);
        h2.infrastructure_rules = vec!["NOT NAME b".to_string()];
        let h3 = view("h3", vec![workload("c", "web.Nginx", "shop")]);

        let admitted = AffinityStrategy::default()
            .filter_hosts(&[h1, h2, h3], &placing(&[]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["h3"]);
    }

    #[test]
    fn strategy_level_rules_apply_everywhere() {
        let hosts = vec![view("empty", vec![]), view("busy", vec![workload("a", "x.A", "x")])];
        let admitted = AffinityStrategy::default()
            .with_rules("NOT EMPTY")
            .filter_hosts(&hosts, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["busy"]);
    }

    #[test]
    fn parse_error_fails_whole_call() {
        let hosts = vec![view("empty", vec![])];
        let err = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["TYPE Foo Bar"]))
            .unwrap_err();
        assert!(matches!(err, PlacementError::Affinity(AffinityError::Parse { .. })));
    }

    #[test]
    fn unknown_predicate_fails_whole_call() {
        let hosts = vec![view("a", vec![]), view("b", vec![])];
        let err = AffinityStrategy::default()
            .filter_hosts(&hosts, &placing(&["PREDICATE nope"]))
            .unwrap_err();
        assert!(matches!(err, PlacementError::Affinity(AffinityError::Configuration(_))));
    }

    // ── Capacity ───────────────────────────────────────────────────

    fn loaded(id: &str, n: usize) -> HostView {
        view(id, (0..n).map(|i| workload(&format!("{id}-{i}"), "x.A", "x")).collect())
    }

    #[test]
    fn max_containers_cap_resolution() {
        let mut capped = loaded("capped", 2);
        capped.max_containers = Some(2);
        let hosts = vec![loaded("full", 8), loaded("seven", 7), capped];

        let default_cap = MaxContainersStrategy::default()
            .filter_hosts(&hosts, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&default_cap), vec!["seven"]);

        let configured = MaxContainersStrategy {
            max_containers: Some(10),
        }
        .filter_hosts(&hosts, &placing(&[]))
        .unwrap();
        assert_eq!(ids(&configured), vec!["full", "seven", "capped"]);
    }

    #[test]
    fn breadth_and_depth_first_ordering() {
        let hosts = vec![loaded("mid", 3), loaded("low", 1), loaded("high", 5), loaded("full", 8)];

        let breadth = BreadthFirstStrategy::default()
            .filter_hosts(&hosts, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&breadth), vec!["low", "mid", "high"]);

        let depth = DepthFirstStrategy::default()
            .filter_hosts(&hosts, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&depth), vec!["high", "mid", "low"]);

        let least = LeastContainersStrategy
            .filter_hosts(&hosts, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&least), vec!["low", "mid", "high", "full"]);
    }

    // ── Labels, groups, CPU ────────────────────────────────────────

    #[test]
    fn label_requires_all_labels() {
        let mut ssd = view("ssd", vec![]);
        ssd.host.labels = vec!["ssd".to_string(), "eu".to_string()];
        let mut hdd = view("hdd", vec![]);
        hdd.host.labels = vec!["eu".to_string()];

        let admitted = LabelStrategy {
            labels: vec!["ssd".to_string(), "eu".to_string()],
        }
        .filter_hosts(&[ssd, hdd], &placing(&[]))
        .unwrap();
        assert_eq!(ids(&admitted), vec!["ssd"]);
    }

    #[test]
    fn group_keeps_siblings_together() {
        let mut placing = placing(&[]);
        placing.parent_id = Some("cluster-1".to_string());

        let mut sibling = workload("s", "db.Postgres", "shop");
        sibling.parent_id = Some("cluster-1".to_string());
        let mut cousin = workload("c", "db.Postgres", "shop");
        cousin.parent_id = Some("cluster-2".to_string());

        let hosts = vec![
            view("sibling", vec![sibling]),
            view("cousin", vec![cousin]),
            view("foreign", vec![workload("f", "x.A", "other")]),
        ];
        let admitted = GroupStrategy::default()
            .filter_hosts(&hosts, &placing)
            .unwrap();
        assert_eq!(ids(&admitted), vec!["sibling", "foreign"]);
    }

    #[test]
    fn exclusive_group_refuses_other_applications() {
        let mut placing = placing(&[]);
        placing.parent_id = Some("cluster-1".to_string());
        let mut sibling = workload("s", "db.Postgres", "shop");
        sibling.parent_id = Some("cluster-1".to_string());

        let hosts = vec![
            view("sibling", vec![sibling.clone()]),
            view("shared", vec![sibling, workload("f", "x.A", "other")]),
            view("foreign", vec![workload("g", "x.A", "other")]),
            view("empty", vec![]),
        ];
        let admitted = GroupStrategy { exclusive: true }
            .filter_hosts(&hosts, &placing)
            .unwrap();
        assert_eq!(ids(&admitted), vec!["sibling", "empty"]);
    }

    // ── Hostname, random ───────────────────────────────────────────

    #[test]
    fn hostname_pattern_must_match_whole_name() {
        let mut named = Vec::new();
        for name in ["docker-1", "docker-12", "docker-1a", "xdocker-2"] {
            let mut v = view(name, vec![]);
            v.host.name = name.to_string();
            named.push(v);
        }
        let admitted = HostnameStrategy::new("docker-[0-9]+")
            .unwrap()
            .filter_hosts(&named, &placing(&[]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["docker-1", "docker-12"]);
    }

    #[test]
    fn invalid_hostname_pattern_is_rejected() {
        assert!(matches!(
            HostnameStrategy::new("docker-("),
            Err(PlacementError::Configuration(_))
        ));
    }

    #[test]
    fn random_keeps_every_host() {
        let hosts: Vec<HostView> = (0..8).map(|i| view(&format!("h{i}"), vec![])).collect();
        let original = ids(&hosts);

        let mut reordered = false;
        for _ in 0..20 {
            let shuffled = RandomStrategy.filter_hosts(&hosts, &placing(&[])).unwrap();
            let mut sorted = ids(&shuffled);
            sorted.sort_unstable();
            assert_eq!(sorted, original);
            reordered |= ids(&shuffled) != original;
        }
        assert!(reordered);
    }

    #[test]
    fn cpu_usage_filters_and_orders() {
        let mut hot = view("hot", vec![]);
        hot.host.cpu_usage = 0.9;
        let mut warm = view("warm", vec![]);
        warm.host.cpu_usage = 0.4;
        let mut cool = view("cool", vec![]);
        cool.host.cpu_usage = 0.1;

        let admitted = CpuUsageStrategy::default()
            .filter_hosts(&[hot, warm, cool], &placing(&[]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["cool", "warm"]);
    }

    // ── Chain ──────────────────────────────────────────────────────

    #[test]
    fn chain_applies_in_order() {
        let hosts = vec![
            view("pg", vec![workload("a", "db.Postgres", "x")]),
            loaded("busy", 4),
            loaded("quiet", 1),
            view("empty", vec![]),
        ];
        let chain = StrategyChain::new()
            .with(AffinityStrategy::default().with_rules("NOT EMPTY"))
            .with(BreadthFirstStrategy::default());
        let admitted = chain.filter_hosts(&hosts, &placing(&["NOT TYPE"])).unwrap();
        assert_eq!(ids(&admitted), vec!["quiet", "busy"]);
    }

    #[test]
    fn chain_from_config() {
        let config = PlacementConfig {
            strategies: vec![
                "affinity".to_string(),
                "label".to_string(),
                "depth-first".to_string(),
            ],
            ..PlacementConfig::default()
        };
        let chain =
            StrategyChain::from_config(&config, Arc::new(PredicateRegistry::default())).unwrap();
        assert_eq!(chain.names(), vec!["affinity", "label", "depth-first"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn chain_from_config_with_hostname_random_and_group() {
        let config = PlacementConfig {
            strategies: vec![
                "hostname".to_string(),
                "group".to_string(),
                "random".to_string(),
            ],
            hostname_pattern: Some("edge-.*".to_string()),
            group_exclusive: true,
            ..PlacementConfig::default()
        };
        let chain =
            StrategyChain::from_config(&config, Arc::new(PredicateRegistry::default())).unwrap();
        assert_eq!(chain.names(), vec!["hostname", "group", "random"]);

        let mut edge = view("e1", vec![]);
        edge.host.name = "edge-1".to_string();
        let mut busy_edge = view("e2", vec![workload("x", "x.A", "other")]);
        busy_edge.host.name = "edge-2".to_string();
        let mut core = view("c1", vec![]);
        core.host.name = "core-1".to_string();

        let admitted = chain
            .filter_hosts(&[edge, busy_edge, core], &placing(&[]))
            .unwrap();
        assert_eq!(ids(&admitted), vec!["e1"]);
    }

    #[test]
    fn hostname_strategy_needs_a_pattern() {
        let mut config = PlacementConfig {
            strategies: vec!["hostname".to_string()],
            ..PlacementConfig::default()
        };
        let registry = Arc::new(PredicateRegistry::default());
        assert!(matches!(
            StrategyChain::from_config(&config, registry.clone()),
            Err(PlacementError::Configuration(_))
        ));

        config.hostname_pattern = Some("[".to_string());
        assert!(matches!(
            StrategyChain::from_config(&config, registry),
            Err(PlacementError::Configuration(_))
        ));
    }

    #[test]
    fn chain_rejects_unknown_strategy() {
        let config = PlacementConfig {
            strategies: vec!["round-robin".to_string()],
            ..PlacementConfig::default()
        };
        let result = StrategyChain::from_config(&config, Arc::new(PredicateRegistry::default()));
        assert!(matches!(result, Err(PlacementError::Configuration(_))));
    }

    #[test]
    fn empty_chain_passes_everything() {
        let hosts = vec![view("a", vec![]), loaded("b", 20)];
        let admitted = StrategyChain::new().filter_hosts(&hosts, &placing(&[])).unwrap();
        assert_eq!(ids(&admitted), vec!["a", "b"]);
    }
}
