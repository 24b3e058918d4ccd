//! fleetgrid-autoscale: capacity headroom scaling signals.
//!
//! Watches the host count and deployed container count of a pool and tells
//! an external autoscaler whether more capacity is needed. This crate never
//! adds or removes hosts itself.
//!
//! # Headroom Algorithm
//!
//! ```text
//! possible  = max_containers * host_count
//! available = possible - container_count
//! needed    = headroom - available
//!
//! if needed > 0:                                HOT
//! if emit_cold and available > headroom + max:  COLD
//! otherwise:                                    OK
//! ```
//!
//! Headroom is either an absolute container count or a fraction of
//! `possible` (`ceil(percent * possible)`).

pub mod headroom;

pub use headroom::{
    Headroom, HeadroomError, HeadroomPolicy, HeadroomReport, HeadroomResult, HeadroomSnapshot,
    HeadroomStatus, ScaleSignal, SignalKind, SignalSink, resolve_max_containers,
};
