//! Service chain model types.

use crate::flow::NodeId;
use serde::{Deserialize, Serialize};
use sfc_types::{MacAddress, MplsLabel, VlanId};
use std::fmt;
use std::net::IpAddr;

/// Service path identifier, carried in-band as the NSH service path.
pub type PathId = u32;

/// Position of a hop in a path; decreases by one per hop.
pub type ServiceIndex = u8;

/// Transport declared by a rendered service path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportType {
    /// Overlay tunnel (VXLAN-GPE) between forwarders.
    VxlanGpe,
    /// Plain Ethernet, addressed by MAC.
    Mac,
    /// MPLS label switching between forwarders.
    Mpls,
    /// Tenant-network interfaces resolved by an external placement service.
    Function,
}

impl TransportType {
    /// Kind of data-plane locator a forwarder uses for this transport.
    pub fn locator_kind(&self) -> LocatorKind {
        match self {
            Self::VxlanGpe => LocatorKind::Ip,
            Self::Mac => LocatorKind::Mac,
            Self::Mpls => LocatorKind::Mpls,
            Self::Function => LocatorKind::LogicalInterface,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VxlanGpe => write!(f, "vxlan-gpe"),
            Self::Mac => write!(f, "mac"),
            Self::Mpls => write!(f, "mpls"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// Encapsulation declared by a rendered service path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encapsulation {
    /// Network Service Header carries path id and service index in-band.
    Nsh,
    /// No chaining header; the transport itself identifies the path.
    Transparent,
    /// Hops are identified by synthetic MAC addresses.
    MacChaining,
}

impl fmt::Display for Encapsulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nsh => write!(f, "nsh"),
            Self::Transparent => write!(f, "transparent"),
            Self::MacChaining => write!(f, "mac-chaining"),
        }
    }
}

/// Direction a path is traversed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Classification of a [`DataPlaneLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Ip,
    Mac,
    Mpls,
    LogicalInterface,
}

/// Where a forwarder or service function can be reached on the data plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataPlaneLocator {
    Ip {
        ip: IpAddr,
        #[serde(default)]
        port: Option<u16>,
    },
    Mac {
        mac: MacAddress,
        #[serde(default)]
        vlan: Option<VlanId>,
    },
    Mpls {
        label: MplsLabel,
    },
    LogicalInterface {
        interface: String,
        #[serde(default)]
        mac: Option<MacAddress>,
    },
}

impl DataPlaneLocator {
    pub fn kind(&self) -> LocatorKind {
        match self {
            Self::Ip { .. } => LocatorKind::Ip,
            Self::Mac { .. } => LocatorKind::Mac,
            Self::Mpls { .. } => LocatorKind::Mpls,
            Self::LogicalInterface { .. } => LocatorKind::LogicalInterface,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ip { ip, .. } => Some(*ip),
            _ => None,
        }
    }

    pub fn mac(&self) -> Option<MacAddress> {
        match self {
            Self::Mac { mac, .. } => Some(*mac),
            Self::LogicalInterface { mac, .. } => *mac,
            _ => None,
        }
    }

    pub fn vlan(&self) -> Option<VlanId> {
        match self {
            Self::Mac { vlan, .. } => *vlan,
            _ => None,
        }
    }

    pub fn mpls_label(&self) -> Option<MplsLabel> {
        match self {
            Self::Mpls { label } => Some(*label),
            _ => None,
        }
    }

    pub fn interface(&self) -> Option<&str> {
        match self {
            Self::LogicalInterface { interface, .. } => Some(interface),
            _ => None,
        }
    }
}

/// One named data-plane locator of a forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderLocator {
    pub name: String,
    pub locator: DataPlaneLocator,
    /// Switch port the locator is bound to.
    #[serde(default)]
    pub port: Option<u32>,
    /// Interface MAC of that port.
    #[serde(default)]
    pub mac: Option<MacAddress>,
    /// Forwarder on the other end of the link, if the locator is a
    /// point-to-point adjacency.
    #[serde(default)]
    pub peer: Option<String>,
}

/// Forwarder-side attachment of one service function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfDictionaryEntry {
    pub service_function: String,
    /// Service function locator used for traffic towards the function.
    pub ingress_locator: String,
    /// Service function locator traffic returns from; defaults to the
    /// ingress locator.
    #[serde(default)]
    pub egress_locator: Option<String>,
    /// Forwarder port facing the service function.
    #[serde(default)]
    pub port: Option<u32>,
    /// Forwarder MAC on that port.
    #[serde(default)]
    pub mac: Option<MacAddress>,
}

/// A switch that steers packets between service functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFunctionForwarder {
    pub name: String,
    /// Identity of the switch the forwarder runs on.
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub locators: Vec<ForwarderLocator>,
    #[serde(default)]
    pub service_functions: Vec<SfDictionaryEntry>,
    /// Locator a path enters through before its first hop.
    #[serde(default)]
    pub ingress_locator: Option<String>,
    /// Locator a path leaves through after its last hop.
    #[serde(default)]
    pub egress_locator: Option<String>,
    /// Output port of an accelerated (userspace) datapath, if any.
    #[serde(default)]
    pub accelerated_port: Option<u32>,
}

impl ServiceFunctionForwarder {
    pub fn locator(&self, name: &str) -> Option<&ForwarderLocator> {
        self.locators.iter().find(|l| l.name == name)
    }

    pub fn dictionary_entry(&self, service_function: &str) -> Option<&SfDictionaryEntry> {
        self.service_functions
            .iter()
            .find(|e| e.service_function == service_function)
    }

    /// Picks the locator of `kind` facing `peer`.
    ///
    /// Falls back to a locator of that kind without a peer, then to any
    /// locator of that kind.
    pub fn locator_towards(&self, kind: LocatorKind, peer: Option<&str>) -> Option<&ForwarderLocator> {
        let mut of_kind = self.locators.iter().filter(|l| l.locator.kind() == kind);
        if let Some(peer) = peer {
            if let Some(found) = of_kind.clone().find(|l| l.peer.as_deref() == Some(peer)) {
                return Some(found);
            }
        }
        of_kind
            .clone()
            .find(|l| l.peer.is_none())
            .or_else(|| of_kind.next())
    }

    /// Locator where a path enters or leaves the chain at this forwarder:
    /// the declared one, else a locator of `kind` without a peer.
    pub fn edge_locator(&self, kind: LocatorKind, declared: Option<&str>) -> Option<&ForwarderLocator> {
        match declared {
            Some(name) => self.locator(name),
            None => self
                .locators
                .iter()
                .find(|l| l.locator.kind() == kind && l.peer.is_none()),
        }
    }

    /// Own tunnel address, if the forwarder has an IP locator.
    pub fn tunnel_ip(&self) -> Option<IpAddr> {
        self.locators.iter().find_map(|l| l.locator.ip())
    }
}

/// One named locator of a service function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfLocator {
    pub name: String,
    pub locator: DataPlaneLocator,
}

/// An appliance or VNF instance processing packets at one hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFunction {
    pub name: String,
    #[serde(default)]
    pub sf_type: String,
    #[serde(default)]
    pub locators: Vec<SfLocator>,
    /// Passes frames through without touching the Ethernet header.
    #[serde(default)]
    pub l2_transparent: bool,
}

impl ServiceFunction {
    pub fn locator(&self, name: &str) -> Option<&SfLocator> {
        self.locators.iter().find(|l| l.name == name)
    }

    /// Logical interfaces of the function, or `None` if any of its
    /// locators is not a logical interface.
    pub fn logical_interfaces(&self) -> Option<Vec<&str>> {
        self.locators.iter().map(|l| l.locator.interface()).collect()
    }
}

/// One hop of a rendered service path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RspHop {
    pub forwarder: String,
    pub service_function: String,
    #[serde(default)]
    pub sf_group: Option<String>,
    pub service_index: ServiceIndex,
}

/// A concrete, directional instantiation of a service chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedServicePath {
    pub name: String,
    pub path_id: PathId,
    pub hops: Vec<RspHop>,
    pub transport: TransportType,
    pub encapsulation: Encapsulation,
    pub starting_index: ServiceIndex,
    #[serde(default)]
    pub direction: Direction,
}

impl RenderedServicePath {
    pub fn is_forward_path(&self) -> bool {
        self.direction == Direction::Forward
    }
}

/// A forwarder locator resolved to the values flows are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLocator {
    pub name: Option<String>,
    pub locator: DataPlaneLocator,
    pub port: Option<u32>,
    pub mac: Option<MacAddress>,
}

impl ResolvedLocator {
    pub fn new(locator: DataPlaneLocator) -> Self {
        Self {
            name: None,
            locator,
            port: None,
            mac: None,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.locator.ip()
    }

    /// Layer-2 address: the locator's own MAC, else the port's MAC.
    pub fn mac(&self) -> Option<MacAddress> {
        self.locator.mac().or(self.mac)
    }

    pub fn vlan(&self) -> Option<VlanId> {
        self.locator.vlan()
    }

    pub fn mpls_label(&self) -> Option<MplsLabel> {
        self.locator.mpls_label()
    }

    pub fn interface(&self) -> Option<&str> {
        self.locator.interface()
    }
}

impl From<&ForwarderLocator> for ResolvedLocator {
    fn from(l: &ForwarderLocator) -> Self {
        Self {
            name: Some(l.name.clone()),
            locator: l.locator.clone(),
            port: l.port,
            mac: l.mac,
        }
    }
}

/// How a service function hangs off a forwarder, in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SfAttachment {
    pub service_function: String,
    pub locator_name: String,
    pub locator: DataPlaneLocator,
    pub forwarder_port: Option<u32>,
    pub forwarder_mac: Option<MacAddress>,
    pub l2_transparent: bool,
}

impl SfAttachment {
    pub fn ip(&self) -> Option<IpAddr> {
        self.locator.ip()
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.locator.mac()
    }

    pub fn vlan(&self) -> Option<VlanId> {
        self.locator.vlan()
    }

    pub fn interface(&self) -> Option<&str> {
        self.locator.interface()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_locator(name: &str, mac: &str, peer: Option<&str>) -> ForwarderLocator {
        ForwarderLocator {
            name: name.to_string(),
            locator: DataPlaneLocator::Mac {
                mac: mac.parse().unwrap(),
                vlan: None,
            },
            port: None,
            mac: None,
            peer: peer.map(str::to_string),
        }
    }

    #[test]
    fn test_locator_towards_prefers_peer() {
        let sff = ServiceFunctionForwarder {
            name: "sff1".to_string(),
            node_id: None,
            locators: vec![
                mac_locator("edge", "00:00:00:00:00:01", None),
                mac_locator("to-sff2", "00:00:00:00:00:02", Some("sff2")),
            ],
            service_functions: vec![],
            ingress_locator: None,
            egress_locator: None,
            accelerated_port: None,
        };

        let towards = sff.locator_towards(LocatorKind::Mac, Some("sff2")).unwrap();
        assert_eq!(towards.name, "to-sff2");
        let edge = sff.locator_towards(LocatorKind::Mac, Some("sff9")).unwrap();
        assert_eq!(edge.name, "edge");
        assert!(sff.locator_towards(LocatorKind::Ip, None).is_none());
    }

    #[test]
    fn test_logical_interfaces_requires_all_logical() {
        let mut sf = ServiceFunction {
            name: "fw".to_string(),
            sf_type: "firewall".to_string(),
            locators: vec![SfLocator {
                name: "p1".to_string(),
                locator: DataPlaneLocator::LogicalInterface {
                    interface: "tap-1".to_string(),
                    mac: None,
                },
            }],
            l2_transparent: false,
        };
        assert_eq!(sf.logical_interfaces(), Some(vec!["tap-1"]));

        sf.locators.push(SfLocator {
            name: "p2".to_string(),
            locator: DataPlaneLocator::Ip {
                ip: "10.0.0.1".parse().unwrap(),
                port: None,
            },
        });
        assert_eq!(sf.logical_interfaces(), None);
    }

    #[test]
    fn test_locator_deserialize_tagged() {
        let loc: DataPlaneLocator =
            serde_json::from_str(r#"{"type":"mac","mac":"00:00:00:00:00:0a","vlan":20}"#).unwrap();
        assert_eq!(loc.kind(), LocatorKind::Mac);
        assert_eq!(loc.vlan().map(|v| v.as_u16()), Some(20));
    }
}
