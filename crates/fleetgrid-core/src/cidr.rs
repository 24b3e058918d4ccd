//! IPv4 CIDR blocks and subnet indexing.
//!
//! The SDN allocator carves a pool (e.g. `169.254.0.0/16`) into equal
//! fixed-size children and hands them out by sequential index:
//!
//! ```text
//! subnet_at(169.254.0.0/16, 27, 8)
//!   offset = 8 * 2^(32 - 27) = 256
//!   base   = 169.254.0.0 + 256 = 169.254.1.0
//!   result = 169.254.1.0/27
//! ```
//!
//! `subnet_at` does not check that the computed child still lies inside
//! the pool. Keeping indices in range is the caller's job.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for CIDR operations.
pub type CidrResult<T> = Result<T, CidrError>;

/// Invalid arguments to CIDR arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    #[error("invalid prefix length {0}: must be within 0..=32")]
    InvalidPrefix(u32),

    #[error("invalid subnet index {0}: must not be negative")]
    NegativeIndex(i64),

    #[error("offset {offset} from {base} leaves the IPv4 address space")]
    OutOfRange { base: Ipv4Addr, offset: u64 },

    #[error("cannot parse CIDR {0:?}")]
    Parse(String),
}

/// An IPv4 address block, `address/prefix_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr {
    /// The link-local block, the default pool for container networks.
    pub const LINK_LOCAL: Cidr = Cidr {
        address: Ipv4Addr::new(169, 254, 0, 0),
        prefix_len: 16,
    };

    pub fn new(address: Ipv4Addr, prefix_len: u8) -> CidrResult<Self> {
        if prefix_len > 32 {
            return Err(CidrError::InvalidPrefix(u32::from(prefix_len)));
        }
        Ok(Self { address, prefix_len })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix_len))
    }

    /// The block with host bits cleared.
    pub fn network(&self) -> Cidr {
        Cidr {
            address: Ipv4Addr::from(u32::from(self.address) & mask_bits(self.prefix_len)),
            prefix_len: self.prefix_len,
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = mask_bits(self.prefix_len);
        u32::from(addr) & mask == u32::from(self.address) & mask
    }

    /// True if the two blocks share at least one address.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        let shorter = self.prefix_len.min(other.prefix_len);
        let mask = mask_bits(shorter);
        u32::from(self.address) & mask == u32::from(other.address) & mask
    }

    /// The address `offset` positions past the network base.
    pub fn address_at_offset(&self, offset: u64) -> CidrResult<Ipv4Addr> {
        let base = u32::from(self.network().address);
        let target = u64::from(base) + offset;
        u32::try_from(target)
            .map(Ipv4Addr::from)
            .map_err(|_| CidrError::OutOfRange {
                base: self.network().address,
                offset,
            })
    }

    /// How many `/prefix_len` children fit in this block.
    pub fn subnet_count(&self, prefix_len: u8) -> CidrResult<u64> {
        if prefix_len > 32 {
            return Err(CidrError::InvalidPrefix(u32::from(prefix_len)));
        }
        if prefix_len < self.prefix_len {
            return Ok(0);
        }
        Ok(1u64 << u32::from(prefix_len - self.prefix_len))
    }
}

fn mask_bits(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

/// Compute the `index`-th `/prefix_len` block counted from the start of `pool`.
///
/// The result is `pool.network() + index * 2^(32 - prefix_len)` with the
/// requested prefix. Fails when `prefix_len > 32`, `index < 0`, or the
/// offset runs past `255.255.255.255`.
pub fn subnet_at(pool: &Cidr, prefix_len: u8, index: i64) -> CidrResult<Cidr> {
    if prefix_len > 32 {
        return Err(CidrError::InvalidPrefix(u32::from(prefix_len)));
    }
    if index < 0 {
        return Err(CidrError::NegativeIndex(index));
    }
    let block = 1u64 << (32 - u32::from(prefix_len));
    let offset = (index as u64)
        .checked_mul(block)
        .ok_or(CidrError::OutOfRange {
            base: pool.network().address,
            offset: u64::MAX,
        })?;
    let base = pool.address_at_offset(offset)?;
    Cidr::new(base, prefix_len)
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| CidrError::Parse(s.to_string()))?;
        let address: Ipv4Addr = addr.parse().map_err(|_| CidrError::Parse(s.to_string()))?;
        let prefix_len: u8 = len.parse().map_err(|_| CidrError::Parse(s.to_string()))?;
        Cidr::new(address, prefix_len)
    }
}

impl TryFrom<String> for Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}
