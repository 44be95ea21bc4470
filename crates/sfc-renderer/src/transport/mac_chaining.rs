//! Hops addressed by synthetic MAC addresses.
//!
//! Hop `si` of path `p` is `MacAddress::synthetic(p, si)`. Frames reach a
//! function with the previous index as source address; a function that is
//! not L2-transparent answers to that address, so its output is already
//! addressed to the next hop.

use super::common::{assign_forwarder_locators, compute_hop_locators, goto};
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{LocatorKind, RenderedServicePath, ResolvedLocator, ServiceIndex, SfAttachment};
use crate::renderer::RenderError;
use sfc_types::MacAddress;

pub struct MacChaining<'a> {
    ctx: ProcessorContext<'a>,
}

impl<'a> MacChaining<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self { ctx }
    }

    fn vmac(&self, si: ServiceIndex) -> MacAddress {
        MacAddress::synthetic(self.ctx.path_id, si)
    }

    /// Address a function replies to after serving hop `si`.
    fn reply_vmac(&self, si: ServiceIndex) -> MacAddress {
        self.vmac(si.saturating_sub(1))
    }

    fn next_hop(&self, flow_match: FlowMatch, rewrite: &[FlowAction]) -> FlowSpec {
        let mut actions = rewrite.to_vec();
        actions.push(goto(FlowTable::TransportEgress));
        FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority::NEXT_HOP)
            .with_match(flow_match)
            .with_actions(actions)
    }

    /// Frames addressed to hop `si` go out to `dst_sf`.
    fn deliver_to_sf(&self, si: ServiceIndex, flow_match: FlowMatch, dst_sf: &SfAttachment) -> Emission {
        let Some(sf_mac) = dst_sf.mac() else {
            return Emission::missing("service function mac");
        };
        Emission::one(self.next_hop(
            flow_match,
            &[FlowAction::SetEthSrc(self.reply_vmac(si)), FlowAction::SetEthDst(sf_mac)],
        ))
    }

    fn egress(&self, kind: FlowKind, flow_match: FlowMatch, port: Option<u32>, what: &'static str) -> Emission {
        match port {
            Some(port) => Emission::one(
                FlowSpec::new(kind, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                    .with_match(flow_match)
                    .with_actions(vec![FlowAction::Output(Port::Number(port))]),
            ),
            None => Emission::missing(what),
        }
    }
}

impl TransportProcessor for MacChaining<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::MacChaining
    }

    fn resolve_forwarder_locators(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
        assign_forwarder_locators(&self.ctx, graph, LocatorKind::Mac);
        for entry in graph.entries_mut() {
            let (Some(src), Some(dst)) = (entry.src.name(), entry.dst.name()) else {
                continue;
            };
            if src == dst {
                continue;
            }
            if let Some(adjacency) = self.ctx.model.forwarder_adjacency(src, dst, self.ctx.path_id) {
                entry.src_egress_locator = adjacency.local.name;
                entry.dst_ingress_locator = adjacency.remote.name;
            }
        }
        Ok(())
    }

    fn compute_transport_values(&mut self, graph: &mut RenderGraph, _rsp: &RenderedServicePath) -> Result<(), RenderError> {
        compute_hop_locators(&self.ctx, graph);
        Ok(())
    }

    fn sff_transport_ingress(&self, entry: &GraphEntry) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::TransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().eth_dst(self.vmac(entry.service_index)))
                .with_actions(vec![goto(FlowTable::NextHop)]),
        )
    }

    fn sf_transport_ingress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let reply = self.reply_vmac(entry.service_index);
        let flow_match = if dst_sf.l2_transparent {
            let Some(sf_mac) = dst_sf.mac() else {
                return Emission::missing("service function mac");
            };
            FlowMatch::new().eth_src(reply).eth_dst(sf_mac)
        } else {
            FlowMatch::new().eth_dst(reply)
        };
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(flow_match)
                .with_actions(vec![goto(FlowTable::NextHop)]),
        )
    }

    fn sff_path_mapper(&self, _entry: &GraphEntry, _hop_ingress: Option<&ResolvedLocator>) -> Emission {
        Emission::not_required()
    }

    fn sf_path_mapper(&self, _entry: &GraphEntry, _dst_sf: &SfAttachment) -> Emission {
        Emission::not_required()
    }

    fn next_hop_sff_to_sf(&self, entry: &GraphEntry, _src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        let si = entry.service_index;
        self.deliver_to_sf(si, FlowMatch::new().eth_dst(self.vmac(si)), dst_sf)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        if !src_sf.l2_transparent {
            // the reply already carries this hop's address
            return Emission::not_required();
        }
        let Some(src_mac) = src_sf.mac() else {
            return Emission::missing("upstream service function mac");
        };
        let si = entry.service_index;
        self.deliver_to_sf(si, FlowMatch::new().eth_src(self.vmac(si)).eth_dst(src_mac), dst_sf)
    }

    fn next_hop_sf_to_sff(&self, entry: &GraphEntry, src_sf: &SfAttachment, _dst_sff: Option<&ResolvedLocator>) -> Emission {
        let vmac = self.vmac(entry.service_index);
        if !src_sf.l2_transparent {
            return Emission::one(self.next_hop(FlowMatch::new().eth_dst(vmac), &[]));
        }
        let Some(src_mac) = src_sf.mac() else {
            return Emission::missing("upstream service function mac");
        };
        Emission::one(self.next_hop(
            FlowMatch::new().eth_src(vmac).eth_dst(src_mac),
            &[FlowAction::SetEthDst(vmac)],
        ))
    }

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let flow_match = FlowMatch::new()
            .eth_src(self.reply_vmac(entry.service_index))
            .eth_dst(dst_sf.mac());
        self.egress(
            FlowKind::SfTransportEgress,
            flow_match,
            dst_sf.forwarder_port,
            "forwarder port towards service function",
        )
    }

    fn sff_transport_egress(
        &self,
        entry: &GraphEntry,
        src_egress: Option<&ResolvedLocator>,
        _dst_ingress: Option<&ResolvedLocator>,
        _hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        self.egress(
            FlowKind::TransportEgress,
            FlowMatch::new().eth_dst(self.vmac(entry.service_index)),
            src_egress.and_then(|l| l.port),
            "forwarder adjacency port",
        )
    }

    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        _src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        self.egress(
            FlowKind::LastHopEgress,
            FlowMatch::new().eth_dst(self.vmac(entry.service_index)),
            path_egress.and_then(|l| l.port),
            "path egress port",
        )
    }
}
