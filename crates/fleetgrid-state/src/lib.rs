//! fleetgrid-state: embedded state store for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the read-only inventory
//! the placement core consumes (infrastructures, hosts, applications,
//! workloads) and the subnet allocation ledger written by the SDN
//! allocator.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by their ids. Relations (workload → host, host → infrastructure)
//! are plain id fields resolved by scans.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
