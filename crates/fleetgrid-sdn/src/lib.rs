//! fleetgrid-sdn: subnet allocation and virtual network lifecycle.
//!
//! An [`SdnProvider`] carves a pool CIDR into fixed-size subnets, one per
//! logical network id, and creates a [`VirtualNetwork`] for each. Networks
//! delegate data-plane work to a [`NetworkProvisioner`], found on the
//! provider or on the first capable [`Location`].
//!
//! # Components
//!
//! - **`provider`**: Subnet ledger, address management, network registry
//! - **`network`**: Per-network state machine and drain-before-deallocate
//! - **`provisioner`**: Provisioning capability and location scan
//! - **`wait`**: Timed polling and watch-channel waits

pub mod error;
pub mod network;
pub mod provider;
pub mod provisioner;
pub mod wait;

pub use error::{SdnError, SdnResult};
pub use network::{NetworkSpec, NetworkStatus, VirtualNetwork};
pub use provider::SdnProvider;
pub use provisioner::{
    InMemoryProvisioner, Location, NetworkProvisioner, ProvisionEvent, find_network_provisioner,
};
pub use wait::{WaitOutcome, repeat_until, watch_until};
