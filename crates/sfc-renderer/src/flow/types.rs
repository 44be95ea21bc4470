use crate::model::{PathId, ServiceIndex};
use crate::placement::PlacementId;
use serde::{Deserialize, Serialize};
use sfc_types::{MacAddress, MplsLabel, VlanId};
use std::fmt;
use std::net::IpAddr;

pub const ETH_TYPE_MPLS: u16 = 0x8847;
pub const ETH_TYPE_NSH: u16 = 0x894f;

/// Identity of an OpenFlow switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_placement(placement: PlacementId) -> Self {
        Self(format!("openflow:{}", placement.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage a flow belongs to.
///
/// Flows name stages symbolically. Numeric table ids are assigned when the
/// flow is staged, so the same flow content can land in the standard or the
/// logical-forwarder pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowTable {
    Classifier,
    TransportIngress,
    PathMapper,
    PathMapperAcl,
    NextHop,
    TransportEgress,
    /// A table outside the chaining pipeline.
    Raw(u8),
}

/// Numeric table ids of the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    pub classifier: u8,
    pub transport_ingress: u8,
    pub path_mapper: u8,
    pub path_mapper_acl: u8,
    pub next_hop: u8,
    pub transport_egress: u8,
}

impl TableIndex {
    /// Standard pipeline shifted by `offset`.
    pub const fn standard(offset: u8) -> Self {
        Self {
            classifier: offset,
            transport_ingress: offset.saturating_add(1),
            path_mapper: offset.saturating_add(2),
            path_mapper_acl: offset.saturating_add(3),
            next_hop: offset.saturating_add(4),
            transport_egress: offset.saturating_add(10),
        }
    }

    pub fn resolve(&self, table: FlowTable) -> u8 {
        match table {
            FlowTable::Classifier => self.classifier,
            FlowTable::TransportIngress => self.transport_ingress,
            FlowTable::PathMapper => self.path_mapper,
            FlowTable::PathMapperAcl => self.path_mapper_acl,
            FlowTable::NextHop => self.next_hop,
            FlowTable::TransportEgress => self.transport_egress,
            FlowTable::Raw(id) => id,
        }
    }
}

impl Default for TableIndex {
    fn default() -> Self {
        Self::standard(0)
    }
}

/// Flow priorities. Higher wins.
pub mod priority {
    pub const MATCH_ANY: u16 = 5;
    pub const TRANSPORT_INGRESS: u16 = 250;
    pub const PATH_MAPPER: u16 = 350;
    pub const PATH_MAPPER_ACL: u16 = 450;
    pub const NEXT_HOP: u16 = 550;
    /// Next hops that do not match a source address yield to ones that do.
    pub const NEXT_HOP_ANY_SOURCE: u16 = NEXT_HOP - 10;
    pub const TRANSPORT_EGRESS: u16 = 650;
    pub const NSH_CONTEXT_EGRESS: u16 = TRANSPORT_EGRESS + 10;
    pub const LAST_HOP_EGRESS: u16 = TRANSPORT_EGRESS + 20;
    pub const APP_COEXISTENCE_EGRESS: u16 = TRANSPORT_EGRESS + 30;
    pub const ACCELERATED_BYPASS: u16 = 1000;
}

/// Who a flow belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowOwner {
    /// Per-switch defaults shared by every path.
    Unowned,
    Path(PathId),
}

impl fmt::Display for FlowOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unowned => write!(f, "unowned"),
            Self::Path(id) => write!(f, "path-{id}"),
        }
    }
}

/// Which leg produced a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    MatchAny,
    AcceleratedBypass,
    TransportIngress,
    SfTransportIngress,
    PathMapper,
    SfPathMapper,
    NextHop,
    SfTransportEgress,
    TransportEgress,
    LastHopEgress,
    NshContextEgress,
    AppCoexistenceEgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Port {
    Number(u32),
    InPort,
    Local,
    Interface(String),
}

/// Match fields of a flow. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_port: Option<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpls_label: Option<MplsLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsp: Option<PathId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsi: Option<ServiceIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsh_c1: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tun_dst: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<u64>,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }

    pub fn in_port(mut self, port: impl Into<Option<Port>>) -> Self {
        self.in_port = port.into();
        self
    }

    pub fn eth_type(mut self, eth_type: u16) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    pub fn eth_src(mut self, mac: impl Into<Option<MacAddress>>) -> Self {
        self.eth_src = mac.into();
        self
    }

    pub fn eth_dst(mut self, mac: impl Into<Option<MacAddress>>) -> Self {
        self.eth_dst = mac.into();
        self
    }

    pub fn vlan(mut self, vlan: impl Into<Option<VlanId>>) -> Self {
        self.vlan = vlan.into();
        self
    }

    pub fn mpls_label(mut self, label: MplsLabel) -> Self {
        self.eth_type = Some(ETH_TYPE_MPLS);
        self.mpls_label = Some(label);
        self
    }

    /// Service path and index carried in the NSH header.
    pub fn nsh(mut self, nsp: PathId, nsi: ServiceIndex) -> Self {
        self.eth_type = Some(ETH_TYPE_NSH);
        self.nsp = Some(nsp);
        self.nsi = Some(nsi);
        self
    }

    pub fn nsp(mut self, nsp: PathId) -> Self {
        self.eth_type = Some(ETH_TYPE_NSH);
        self.nsp = Some(nsp);
        self
    }

    pub fn nsh_c1(mut self, c1: u32) -> Self {
        self.nsh_c1 = Some(c1);
        self
    }

    pub fn tun_dst(mut self, ip: impl Into<Option<IpAddr>>) -> Self {
        self.tun_dst = ip.into();
        self
    }

    pub fn metadata(mut self, metadata: u64) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Instruction or action applied by a flow, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowAction {
    GotoTable(FlowTable),
    Resubmit(FlowTable),
    Output(Port),
    Drop,
    SetEthSrc(MacAddress),
    SetEthDst(MacAddress),
    PushVlan(VlanId),
    PopVlan,
    PushMpls(MplsLabel),
    PopMpls,
    PopNsh,
    WriteMetadata(u64),
    SetTunnelDst(IpAddr),
    MoveNshC1ToTunnelDst,
}

/// Flow content produced by a transport processor, not yet placed on a
/// switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSpec {
    pub kind: FlowKind,
    pub table: FlowTable,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
}

impl FlowSpec {
    pub fn new(kind: FlowKind, table: FlowTable, priority: u16) -> Self {
        Self {
            kind,
            table,
            priority,
            flow_match: FlowMatch::default(),
            actions: Vec::new(),
        }
    }

    pub fn with_match(mut self, flow_match: FlowMatch) -> Self {
        self.flow_match = flow_match;
        self
    }

    pub fn with_actions(mut self, actions: Vec<FlowAction>) -> Self {
        self.actions = actions;
        self
    }
}

/// Identity of a flow within a switch; committing a flow with an existing
/// key replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub node: NodeId,
    pub table_id: u8,
    pub priority: u16,
    pub flow_match: FlowMatch,
}

/// A flow placed on a switch with a resolved table id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEntry {
    pub node: NodeId,
    pub table_id: u8,
    pub table: FlowTable,
    pub priority: u16,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
    pub owner: FlowOwner,
    pub kind: FlowKind,
}

impl FlowEntry {
    pub fn key(&self) -> FlowKey {
        FlowKey {
            node: self.node.clone(),
            table_id: self.table_id,
            priority: self.priority,
            flow_match: self.flow_match.clone(),
        }
    }
}
