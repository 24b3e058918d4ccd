//! FleetGrid placement: decide which hosts may receive a new container.
//!
//! This crate filters a candidate host list for one workload. It does NOT
//! start containers; the orchestrator picks one of the admissible hosts.
//!
//! # Components
//!
//! - **`affinity`**: Rule parser and predicate registry
//! - **`strategy`**: Host filters (affinity, capacity, labels, hostname, CPU) and chains
//! - **`convert`**: Builds strategy inputs from the state store

pub mod affinity;
pub mod convert;
pub mod error;
pub mod strategy;

pub use affinity::{AffinityRules, PredicateRegistry, Rule, Verb, WorkloadPredicate};
pub use convert::{host_to_view, host_views, workload_for_placement};
pub use error::{AffinityError, AffinityResult, PlacementError, PlacementResult};
pub use strategy::{
    AffinityStrategy, BreadthFirstStrategy, CpuUsageStrategy, DepthFirstStrategy, GroupStrategy,
    HostView, HostnameStrategy, LabelStrategy, LeastContainersStrategy, MaxContainersStrategy,
    PlacementStrategy, RandomStrategy, StrategyChain,
};
