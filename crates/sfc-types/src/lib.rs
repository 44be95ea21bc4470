//! Link-layer primitives shared by the SFC flow renderer.
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses, including the synthetic
//!   per-hop addresses used by MAC chaining
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`MplsLabel`]: 20-bit MPLS labels

mod mac;
mod mpls;
mod vlan;

pub use mac::MacAddress;
pub use mpls::MplsLabel;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid MPLS label: {0} (must be 0-1048575)")]
    InvalidMplsLabel(u32),
}
