//! MPLS between forwarders, VLAN towards service functions.
//!
//! The path mapper strips the label (or the function's VLAN) and records
//! the path in metadata. Next hops then match metadata and source MAC.

use super::common::{
    assign_forwarder_locators, compute_hop_locators, goto, mac_next_hop, output_to, path_metadata,
};
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, ETH_TYPE_MPLS};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{LocatorKind, RenderedServicePath, ResolvedLocator, SfAttachment};
use crate::renderer::RenderError;

pub struct Mpls<'a> {
    ctx: ProcessorContext<'a>,
}

impl<'a> Mpls<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self { ctx }
    }

    fn path_mapper(&self, kind: FlowKind, flow_match: FlowMatch, pop: FlowAction) -> FlowSpec {
        FlowSpec::new(kind, FlowTable::PathMapper, priority::PATH_MAPPER)
            .with_match(flow_match)
            .with_actions(vec![
                pop,
                FlowAction::WriteMetadata(path_metadata(self.ctx.path_id)),
                goto(FlowTable::NextHop),
            ])
    }
}

impl TransportProcessor for Mpls<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::Mpls
    }

    fn resolve_forwarder_locators(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
        assign_forwarder_locators(&self.ctx, graph, LocatorKind::Mpls);
        Ok(())
    }

    fn compute_transport_values(&mut self, graph: &mut RenderGraph, _rsp: &RenderedServicePath) -> Result<(), RenderError> {
        compute_hop_locators(&self.ctx, graph);
        Ok(())
    }

    fn sff_transport_ingress(&self, _entry: &GraphEntry) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::TransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().eth_type(ETH_TYPE_MPLS))
                .with_actions(vec![goto(FlowTable::PathMapper)]),
        )
    }

    fn sf_transport_ingress(&self, _entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let Some(vlan) = dst_sf.vlan() else {
            return Emission::missing("service function vlan");
        };
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().vlan(vlan))
                .with_actions(vec![goto(FlowTable::PathMapper)]),
        )
    }

    fn sff_path_mapper(&self, _entry: &GraphEntry, hop_ingress: Option<&ResolvedLocator>) -> Emission {
        match hop_ingress.and_then(ResolvedLocator::mpls_label) {
            Some(label) => Emission::one(self.path_mapper(
                FlowKind::PathMapper,
                FlowMatch::new().mpls_label(label),
                FlowAction::PopMpls,
            )),
            None => Emission::missing("hop mpls label"),
        }
    }

    fn sf_path_mapper(&self, _entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        match dst_sf.vlan() {
            Some(vlan) => Emission::one(self.path_mapper(
                FlowKind::SfPathMapper,
                FlowMatch::new().vlan(vlan),
                FlowAction::PopVlan,
            )),
            None => Emission::missing("service function vlan"),
        }
    }

    fn next_hop_sff_to_sf(&self, _entry: &GraphEntry, src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        Emission::one(mac_next_hop(
            self.ctx.path_id,
            src_sff.and_then(ResolvedLocator::mac),
            dst_sf.mac(),
        ))
    }

    fn next_hop_sf_to_sf(&self, _entry: &GraphEntry, src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        Emission::one(mac_next_hop(self.ctx.path_id, src_sf.mac(), dst_sf.mac()))
    }

    fn next_hop_sf_to_sff(&self, _entry: &GraphEntry, src_sf: &SfAttachment, dst_sff: Option<&ResolvedLocator>) -> Emission {
        Emission::one(mac_next_hop(
            self.ctx.path_id,
            src_sf.mac(),
            dst_sff.and_then(ResolvedLocator::mac),
        ))
    }

    fn sf_transport_egress(&self, _entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let mut actions = Vec::with_capacity(2);
        if let Some(vlan) = dst_sf.vlan() {
            actions.push(FlowAction::PushVlan(vlan));
        }
        actions.push(output_to(dst_sf.forwarder_port));
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(
                    FlowMatch::new()
                        .metadata(path_metadata(self.ctx.path_id))
                        .eth_dst(dst_sf.mac()),
                )
                .with_actions(actions),
        )
    }

    fn sff_transport_egress(
        &self,
        _entry: &GraphEntry,
        src_egress: Option<&ResolvedLocator>,
        dst_ingress: Option<&ResolvedLocator>,
        hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        let Some(label) = hop_ingress.and_then(ResolvedLocator::mpls_label) else {
            return Emission::missing("hop mpls label");
        };
        let mut actions: Vec<FlowAction> = src_egress
            .and_then(ResolvedLocator::mac)
            .map(FlowAction::SetEthSrc)
            .into_iter()
            .collect();
        actions.push(FlowAction::PushMpls(label));
        actions.push(output_to(src_egress.and_then(|l| l.port)));
        Emission::one(
            FlowSpec::new(FlowKind::TransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(
                    FlowMatch::new()
                        .metadata(path_metadata(self.ctx.path_id))
                        .eth_dst(dst_ingress.and_then(ResolvedLocator::mac)),
                )
                .with_actions(actions),
        )
    }

    /// Only traffic coming back from the last function leaves the chain.
    /// Matching on its source MAC keeps deliveries to earlier functions on
    /// this forwarder out of the hand-off.
    fn terminal_transport_egress(
        &self,
        _entry: &GraphEntry,
        src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        let Some(port) = path_egress.and_then(|l| l.port) else {
            return Emission::missing("path egress port");
        };
        let Some(last_sf) = src_sf.and_then(SfAttachment::mac) else {
            return Emission::missing("last service function mac");
        };
        Emission::one(
            FlowSpec::new(FlowKind::LastHopEgress, FlowTable::TransportEgress, priority::LAST_HOP_EGRESS)
                .with_match(
                    FlowMatch::new()
                        .metadata(path_metadata(self.ctx.path_id))
                        .eth_src(last_sf),
                )
                .with_actions(vec![output_to(Some(port))]),
        )
    }
}
