//! fleetgrid-core: shared types for the FleetGrid control layer.
//!
//! - **`cidr`**: IPv4 address-block arithmetic used by the SDN allocator
//! - **`config`**: `fleet.toml` configuration model

pub mod cidr;
pub mod config;

pub use cidr::{Cidr, CidrError, CidrResult, subnet_at};
pub use config::{FleetConfig, HeadroomConfig, PlacementConfig, SdnConfig};
