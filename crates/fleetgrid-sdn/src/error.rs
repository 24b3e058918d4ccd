use std::time::Duration;

use fleetgrid_core::CidrError;
use fleetgrid_state::StateError;
use thiserror::Error;

pub type SdnResult<T> = Result<T, SdnError>;

#[derive(Debug, Error)]
pub enum SdnError {
    #[error("sdn configuration error: {0}")]
    Configuration(String),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("network provisioning failed: {0}")]
    Provisioning(String),

    #[error("invalid network state: {0}")]
    InvalidState(String),

    #[error("no free addresses left in {0}")]
    AddressExhausted(String),

    #[error(transparent)]
    Cidr(#[from] CidrError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}
