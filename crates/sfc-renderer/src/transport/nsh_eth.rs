//! NSH over plain Ethernet.
//!
//! The path id and index travel in the NSH header, so no path mapper is
//! needed. Next hops rewrite the MAC pair of the frame.

use super::common::{assign_forwarder_locators, compute_hop_locators, goto, output_to};
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{LocatorKind, RenderedServicePath, ResolvedLocator, SfAttachment};
use crate::renderer::RenderError;
use sfc_types::MacAddress;

pub struct NshEthernet<'a> {
    ctx: ProcessorContext<'a>,
}

impl<'a> NshEthernet<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self { ctx }
    }

    fn nsh_match(&self, entry: &GraphEntry) -> FlowMatch {
        FlowMatch::new().nsh(self.ctx.path_id, entry.service_index)
    }

    fn deliver_to_sf(&self, entry: &GraphEntry, src_mac: Option<MacAddress>, dst_sf: &SfAttachment) -> Emission {
        let Some(sf_mac) = dst_sf.mac() else {
            return Emission::missing("service function mac");
        };
        let mut actions = Vec::with_capacity(3);
        if let Some(src) = dst_sf.forwarder_mac.or(src_mac) {
            actions.push(FlowAction::SetEthSrc(src));
        }
        actions.push(FlowAction::SetEthDst(sf_mac));
        actions.push(goto(FlowTable::TransportEgress));
        Emission::one(
            FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority::NEXT_HOP)
                .with_match(self.nsh_match(entry))
                .with_actions(actions),
        )
    }
}

impl TransportProcessor for NshEthernet<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::NshEthernet
    }

    fn resolve_forwarder_locators(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
        assign_forwarder_locators(&self.ctx, graph, LocatorKind::Mac);
        Ok(())
    }

    fn compute_transport_values(&mut self, graph: &mut RenderGraph, _rsp: &RenderedServicePath) -> Result<(), RenderError> {
        compute_hop_locators(&self.ctx, graph);
        Ok(())
    }

    fn sff_transport_ingress(&self, _entry: &GraphEntry) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::TransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().nsp(self.ctx.path_id))
                .with_actions(vec![goto(FlowTable::NextHop)]),
        )
    }

    fn sf_transport_ingress(&self, _entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let Some(port) = dst_sf.forwarder_port else {
            return Emission::not_required();
        };
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().in_port(Port::Number(port)).nsp(self.ctx.path_id))
                .with_actions(vec![goto(FlowTable::NextHop)]),
        )
    }

    fn sff_path_mapper(&self, _entry: &GraphEntry, _hop_ingress: Option<&ResolvedLocator>) -> Emission {
        Emission::not_required()
    }

    fn sf_path_mapper(&self, _entry: &GraphEntry, _dst_sf: &SfAttachment) -> Emission {
        Emission::not_required()
    }

    fn next_hop_sff_to_sf(&self, entry: &GraphEntry, src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        self.deliver_to_sf(entry, src_sff.and_then(ResolvedLocator::mac), dst_sf)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, _src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        self.deliver_to_sf(entry, None, dst_sf)
    }

    fn next_hop_sf_to_gateway(&self, entry: &GraphEntry, _src_sf: &SfAttachment) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority::NEXT_HOP)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![goto(FlowTable::TransportEgress)]),
        )
    }

    fn next_hop_sf_to_sff(&self, entry: &GraphEntry, _src_sf: &SfAttachment, _dst_sff: Option<&ResolvedLocator>) -> Emission {
        if entry.dst.is_egress() {
            return Emission::not_required();
        }
        Emission::unsupported("nsh over ethernet between forwarders")
    }

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let flow_match = self.nsh_match(entry).eth_dst(dst_sf.mac());
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(flow_match)
                .with_actions(vec![output_to(dst_sf.forwarder_port)]),
        )
    }

    fn sff_transport_egress(
        &self,
        _entry: &GraphEntry,
        _src_egress: Option<&ResolvedLocator>,
        _dst_ingress: Option<&ResolvedLocator>,
        _hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        Emission::unsupported("nsh over ethernet between forwarders")
    }

    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        _src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        let handoff = match path_egress.and_then(|l| l.port) {
            Some(port) => FlowAction::Output(Port::Number(port)),
            None => FlowAction::Resubmit(FlowTable::Raw(self.ctx.config.app_coexistence_table)),
        };
        Emission::one(
            FlowSpec::new(FlowKind::LastHopEgress, FlowTable::TransportEgress, priority::LAST_HOP_EGRESS)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![FlowAction::PopNsh, handoff]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::super::SkipReason;
    use super::*;
    use crate::graph::ForwarderRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_function_to_gateway_needs_no_forwarder_leg() {
        let fixture = fixtures::Fixture::empty();
        let eth = NshEthernet::new(fixture.ctx(7));
        let sf = fixtures::mac_sf("sf1", "00:00:00:00:f1:01", None, Some(12));

        let to_gateway = fixtures::entry(fixtures::sff("sff-a"), ForwarderRef::Egress, None, 254);
        assert_eq!(eth.next_hop_sf_to_sff(&to_gateway, &sf, None), Emission::not_required());

        let across = fixtures::entry(fixtures::sff("sff-a"), fixtures::sff("sff-b"), Some("sf2"), 254);
        assert!(matches!(
            eth.next_hop_sf_to_sff(&across, &sf, None),
            Emission::Skipped(SkipReason::Unsupported(_))
        ));
    }

    #[test]
    fn test_delivery_prefers_dictionary_source_mac() {
        let fixture = fixtures::Fixture::empty();
        let eth = NshEthernet::new(fixture.ctx(7));
        let entry = fixtures::entry(ForwarderRef::Ingress, fixtures::sff("sff-a"), Some("sf1"), 255);
        let mut sf = fixtures::mac_sf("sf1", "00:00:00:00:f1:01", None, Some(12));
        let sff_mac = fixtures::resolved_mac("02:00:00:00:0a:00", Some(11));

        let Emission::Flows(flows) = eth.next_hop_sff_to_sf(&entry, Some(&sff_mac), &sf) else {
            panic!("expected flows");
        };
        assert_eq!(flows[0].flow_match, FlowMatch::new().nsh(7, 255));
        assert_eq!(
            flows[0].actions,
            vec![
                FlowAction::SetEthSrc(fixtures::mac("02:00:00:00:0a:00")),
                FlowAction::SetEthDst(fixtures::mac("00:00:00:00:f1:01")),
                goto(FlowTable::TransportEgress),
            ]
        );

        sf.forwarder_mac = Some(fixtures::mac("02:00:00:00:0a:0c"));
        let Emission::Flows(flows) = eth.next_hop_sff_to_sf(&entry, Some(&sff_mac), &sf) else {
            panic!("expected flows");
        };
        assert_eq!(flows[0].actions[0], FlowAction::SetEthSrc(fixtures::mac("02:00:00:00:0a:0c")));
    }

    #[test]
    fn test_terminal_without_egress_port_resubmits() {
        let fixture = fixtures::Fixture::empty();
        let eth = NshEthernet::new(fixture.ctx(7));
        let entry = fixtures::entry(fixtures::sff("sff-a"), ForwarderRef::Egress, None, 254);

        let Emission::Flows(flows) = eth.terminal_transport_egress(&entry, None, None) else {
            panic!("expected flows");
        };
        assert_eq!(
            flows[0].actions,
            vec![
                FlowAction::PopNsh,
                FlowAction::Resubmit(FlowTable::Raw(fixture.config.app_coexistence_table)),
            ]
        );

        let egress = fixtures::resolved_mac("02:00:00:00:0a:00", Some(11));
        let Emission::Flows(flows) = eth.terminal_transport_egress(&entry, None, Some(&egress)) else {
            panic!("expected flows");
        };
        assert_eq!(flows[0].actions, vec![FlowAction::PopNsh, FlowAction::Output(Port::Number(11))]);
    }
}
