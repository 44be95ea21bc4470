//! Encapsulation-specific flow strategies.
//!
//! A [`TransportProcessor`] decides which flows one graph entry needs in
//! each pipeline table. The orchestrator owns the traversal and staging;
//! processors only compute per-path values and describe flows.

mod common;
#[cfg(test)]
mod fixtures;
mod logical;
mod mac_chaining;
mod mpls;
mod nsh_eth;
mod nsh_tunnel;
mod vlan;

pub use logical::LogicalForwarder;
pub use mac_chaining::MacChaining;
pub use mpls::Mpls;
pub use nsh_eth::NshEthernet;
pub use nsh_tunnel::NshTunnel;
pub use vlan::{Vlan, VlanPool};

use crate::config::RendererConfig;
use crate::flow::{FlowSpec, TableIndex};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{
    Encapsulation, ModelReader, PathId, RenderedServicePath, ResolvedLocator,
    ServiceFunctionForwarder, SfAttachment, TransportType,
};
use crate::opstate::OperationalStateSink;
use crate::placement::PlacementResolver;
use crate::renderer::RenderError;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Why a leg produced no flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The encapsulation handles this leg without a flow.
    NotRequired,
    /// A locator or address the flow needs is not in the model.
    MissingLocator(&'static str),
    /// The variant has no implementation for this leg.
    Unsupported(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => write!(f, "not required"),
            Self::MissingLocator(what) => write!(f, "missing {what}"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

/// Result of one emit operation.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Flows(Vec<FlowSpec>),
    Skipped(SkipReason),
}

impl Emission {
    pub fn one(spec: FlowSpec) -> Self {
        Self::Flows(vec![spec])
    }

    pub fn not_required() -> Self {
        Self::Skipped(SkipReason::NotRequired)
    }

    pub fn missing(what: &'static str) -> Self {
        Self::Skipped(SkipReason::MissingLocator(what))
    }

    pub fn unsupported(what: &'static str) -> Self {
        Self::Skipped(SkipReason::Unsupported(what))
    }

    pub fn flows(&self) -> &[FlowSpec] {
        match self {
            Self::Flows(flows) => flows,
            Self::Skipped(_) => &[],
        }
    }
}

/// Read-only collaborators a processor consults during one render.
#[derive(Clone, Copy)]
pub struct ProcessorContext<'a> {
    pub model: &'a dyn ModelReader,
    pub placement: &'a dyn PlacementResolver,
    pub config: &'a RendererConfig,
    /// VLAN ids of live paths, shared by every render of one renderer.
    pub vlans: &'a Mutex<VlanPool>,
    pub path_id: PathId,
}

impl ProcessorContext<'_> {
    pub fn forwarder(&self, name: &str) -> Option<ServiceFunctionForwarder> {
        self.model.forwarder(name, self.path_id)
    }

    pub fn forwarder_locator(&self, forwarder: &str, locator: &str) -> Option<ResolvedLocator> {
        let forwarder = self.forwarder(forwarder)?;
        self.model.forwarder_locator(&forwarder, locator)
    }
}

/// Per-encapsulation flow strategy.
///
/// Legs are named from the point of view of the graph entry: `sff_*` legs
/// concern the forwarder, `sf_*` legs the service function delivered to,
/// and next hops name their source and destination kinds.
pub trait TransportProcessor {
    fn variant(&self) -> TransportVariant;

    /// Names ingress and egress locators on the graph entries.
    fn resolve_forwarder_locators(&mut self, _graph: &mut RenderGraph) -> Result<(), RenderError> {
        Ok(())
    }

    /// Fills in hop-ingress and path-egress locators.
    fn compute_transport_values(
        &mut self,
        graph: &mut RenderGraph,
        rsp: &RenderedServicePath,
    ) -> Result<(), RenderError>;

    /// Alternate table numbering for logical mode.
    fn table_index_override(&self) -> Option<TableIndex> {
        None
    }

    fn sff_transport_ingress(&self, entry: &GraphEntry) -> Emission;

    fn sf_transport_ingress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission;

    fn sff_path_mapper(&self, entry: &GraphEntry, hop_ingress: Option<&ResolvedLocator>) -> Emission;

    fn sf_path_mapper(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission;

    fn next_hop_gateway_to_sf(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        self.next_hop_sff_to_sf(entry, None, dst_sf)
    }

    fn next_hop_sff_to_sf(
        &self,
        entry: &GraphEntry,
        src_sff: Option<&ResolvedLocator>,
        dst_sf: &SfAttachment,
    ) -> Emission;

    fn next_hop_sf_to_gateway(&self, entry: &GraphEntry, src_sf: &SfAttachment) -> Emission {
        self.next_hop_sf_to_sff(entry, src_sf, None)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission;

    fn next_hop_sf_to_sff(
        &self,
        entry: &GraphEntry,
        src_sf: &SfAttachment,
        dst_sff: Option<&ResolvedLocator>,
    ) -> Emission;

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission;

    fn sff_transport_egress(
        &self,
        entry: &GraphEntry,
        src_egress: Option<&ResolvedLocator>,
        dst_ingress: Option<&ResolvedLocator>,
        hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission;

    /// Flows that hand traffic off the chain after the last hop. `src_sf`
    /// is where traffic comes back out of the last function.
    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission;

    /// Called once the render has been committed.
    fn on_render_complete(
        &self,
        graph: &RenderGraph,
        rsp: &RenderedServicePath,
        opstate: &dyn OperationalStateSink,
    ) {
        opstate.on_create(rsp, graph);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportVariant {
    NshTunnel,
    NshEthernet,
    Mpls,
    Vlan,
    MacChaining,
    LogicalForwarder,
}

impl fmt::Display for TransportVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NshTunnel => "nsh-tunnel",
            Self::NshEthernet => "nsh-ethernet",
            Self::Mpls => "mpls",
            Self::Vlan => "vlan",
            Self::MacChaining => "mac-chaining",
            Self::LogicalForwarder => "logical-forwarder",
        };
        f.write_str(name)
    }
}

impl TransportVariant {
    /// Fresh processor for one render.
    pub fn processor<'a>(self, ctx: ProcessorContext<'a>) -> Box<dyn TransportProcessor + 'a> {
        match self {
            Self::NshTunnel => Box::new(NshTunnel::new(ctx)),
            Self::NshEthernet => Box::new(NshEthernet::new(ctx)),
            Self::Mpls => Box::new(Mpls::new(ctx)),
            Self::Vlan => Box::new(Vlan::new(ctx)),
            Self::MacChaining => Box::new(MacChaining::new(ctx)),
            Self::LogicalForwarder => Box::new(LogicalForwarder::new(ctx)),
        }
    }
}

/// Lookup key of the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKey {
    Declared(TransportType, Encapsulation),
    /// Any path whose functions are placed behind logical interfaces.
    LogicalForwarder,
}

impl TransportKey {
    pub fn for_path(rsp: &RenderedServicePath, graph: &RenderGraph) -> Self {
        if graph.is_logical_mode() {
            Self::LogicalForwarder
        } else {
            Self::Declared(rsp.transport, rsp.encapsulation)
        }
    }
}

const DISPATCH_TABLE: &[(TransportKey, TransportVariant)] = &[
    (
        TransportKey::Declared(TransportType::VxlanGpe, Encapsulation::Nsh),
        TransportVariant::NshTunnel,
    ),
    (
        TransportKey::Declared(TransportType::Mac, Encapsulation::Nsh),
        TransportVariant::NshEthernet,
    ),
    (
        TransportKey::Declared(TransportType::Mpls, Encapsulation::Transparent),
        TransportVariant::Mpls,
    ),
    (
        TransportKey::Declared(TransportType::Mac, Encapsulation::Transparent),
        TransportVariant::Vlan,
    ),
    (
        TransportKey::Declared(TransportType::Mac, Encapsulation::MacChaining),
        TransportVariant::MacChaining,
    ),
    (TransportKey::LogicalForwarder, TransportVariant::LogicalForwarder),
];

pub fn select_variant(key: TransportKey) -> Option<TransportVariant> {
    DISPATCH_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, variant)| *variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        assert_eq!(
            select_variant(TransportKey::Declared(TransportType::VxlanGpe, Encapsulation::Nsh)),
            Some(TransportVariant::NshTunnel)
        );
        assert_eq!(
            select_variant(TransportKey::Declared(TransportType::Mac, Encapsulation::Transparent)),
            Some(TransportVariant::Vlan)
        );
        assert_eq!(
            select_variant(TransportKey::LogicalForwarder),
            Some(TransportVariant::LogicalForwarder)
        );
        assert_eq!(
            select_variant(TransportKey::Declared(TransportType::Mpls, Encapsulation::Nsh)),
            None
        );
        assert_eq!(
            select_variant(TransportKey::Declared(TransportType::Function, Encapsulation::Nsh)),
            None
        );
    }

    #[test]
    fn test_skipped_emission_has_no_flows() {
        assert!(Emission::missing("ip").flows().is_empty());
        assert_eq!(Emission::not_required(), Emission::Skipped(SkipReason::NotRequired));
    }
}
