//! Placement of tenant-logical interfaces onto switches.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Opaque identifier of the switch hosting a logical interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementId(pub u64);

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("interface {0} is not placed on any switch")]
    NotFound(String),
    #[error("no tunnel interface from {src} to {dst}")]
    NoTunnel { src: PlacementId, dst: PlacementId },
}

/// External service that knows where logical interfaces live.
pub trait PlacementResolver: Send + Sync {
    fn resolve_placement(&self, interface: &str) -> Result<PlacementId, PlacementError>;

    /// Tunnel port on `src` that reaches `dst`.
    fn tunnel_interface(&self, src: PlacementId, dst: PlacementId) -> Result<String, PlacementError>;
}

/// Resolver for deployments without logical interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlacement;

impl PlacementResolver for NoPlacement {
    fn resolve_placement(&self, interface: &str) -> Result<PlacementId, PlacementError> {
        Err(PlacementError::NotFound(interface.to_string()))
    }

    fn tunnel_interface(&self, src: PlacementId, dst: PlacementId) -> Result<String, PlacementError> {
        Err(PlacementError::NoTunnel { src, dst })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSpec {
    pub src: PlacementId,
    pub dst: PlacementId,
    pub interface: String,
}

/// Serializable form of a [`StaticPlacementResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPlacementConfig {
    #[serde(default)]
    pub interfaces: BTreeMap<String, PlacementId>,
    #[serde(default)]
    pub tunnels: Vec<TunnelSpec>,
}

/// Placement resolver over a fixed interface table.
#[derive(Debug, Default, Clone)]
pub struct StaticPlacementResolver {
    interfaces: HashMap<String, PlacementId>,
    tunnels: HashMap<(PlacementId, PlacementId), String>,
}

impl StaticPlacementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, interface: impl Into<String>, placement: PlacementId) -> Self {
        self.interfaces.insert(interface.into(), placement);
        self
    }

    pub fn with_tunnel(mut self, src: PlacementId, dst: PlacementId, interface: impl Into<String>) -> Self {
        self.tunnels.insert((src, dst), interface.into());
        self
    }
}

impl From<StaticPlacementConfig> for StaticPlacementResolver {
    fn from(config: StaticPlacementConfig) -> Self {
        let resolver = config
            .interfaces
            .into_iter()
            .fold(Self::new(), |r, (iface, p)| r.with_interface(iface, p));
        config
            .tunnels
            .into_iter()
            .fold(resolver, |r, t| r.with_tunnel(t.src, t.dst, t.interface))
    }
}

impl PlacementResolver for StaticPlacementResolver {
    fn resolve_placement(&self, interface: &str) -> Result<PlacementId, PlacementError> {
        self.interfaces
            .get(interface)
            .copied()
            .ok_or_else(|| PlacementError::NotFound(interface.to_string()))
    }

    fn tunnel_interface(&self, src: PlacementId, dst: PlacementId) -> Result<String, PlacementError> {
        self.tunnels
            .get(&(src, dst))
            .cloned()
            .ok_or(PlacementError::NoTunnel { src, dst })
    }
}
