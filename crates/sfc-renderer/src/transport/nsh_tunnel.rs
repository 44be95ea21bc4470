//! NSH over a VXLAN-GPE tunnel mesh.
//!
//! Next hops are chosen by setting the tunnel destination. Service
//! functions reached by MAC are handled by the Ethernet variant.

use super::common::{assign_forwarder_locators, compute_hop_locators, goto, output_to};
use super::nsh_eth::NshEthernet;
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{LocatorKind, RenderedServicePath, ResolvedLocator, SfAttachment};
use crate::renderer::RenderError;
use std::net::IpAddr;

pub struct NshTunnel<'a> {
    ctx: ProcessorContext<'a>,
    ethernet: NshEthernet<'a>,
}

impl<'a> NshTunnel<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self {
            ctx,
            ethernet: NshEthernet::new(ctx),
        }
    }

    fn nsh_match(&self, entry: &GraphEntry) -> FlowMatch {
        FlowMatch::new().nsh(self.ctx.path_id, entry.service_index)
    }

    fn is_mac_attached(sf: &SfAttachment) -> bool {
        sf.locator.kind() == LocatorKind::Mac
    }

    /// The function shares the tunnel address of a forwarder without an
    /// accelerated datapath, so traffic to it loops through the local port.
    fn is_loopback(&self, entry: &GraphEntry, sf: &SfAttachment) -> bool {
        let Some(sf_ip) = sf.ip() else {
            return false;
        };
        entry
            .dst
            .name()
            .and_then(|name| self.ctx.forwarder(name))
            .is_some_and(|f| f.accelerated_port.is_none() && f.tunnel_ip() == Some(sf_ip))
    }

    fn tunnel_next_hop(&self, entry: &GraphEntry, ip: IpAddr) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority::NEXT_HOP)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![FlowAction::SetTunnelDst(ip), goto(FlowTable::TransportEgress)]),
        )
    }

    fn deliver_to_sf(&self, entry: &GraphEntry, src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        if Self::is_mac_attached(dst_sf) {
            return self.ethernet.next_hop_sff_to_sf(entry, src_sff, dst_sf);
        }
        match dst_sf.ip() {
            Some(ip) => self.tunnel_next_hop(entry, ip),
            None => Emission::missing("service function ip"),
        }
    }
}

impl TransportProcessor for NshTunnel<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::NshTunnel
    }

    fn resolve_forwarder_locators(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
        assign_forwarder_locators(&self.ctx, graph, LocatorKind::Ip);
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

    fn sf_transport_ingress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        if Self::is_mac_attached(dst_sf) {
            return self.ethernet.sf_transport_ingress(entry, dst_sf);
        }
        if !self.is_loopback(entry, dst_sf) {
            return Emission::not_required();
        }
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().in_port(Port::Local).nsp(self.ctx.path_id))
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
        self.deliver_to_sf(entry, src_sff, dst_sf)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, _src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        self.deliver_to_sf(entry, None, dst_sf)
    }

    fn next_hop_sf_to_gateway(&self, entry: &GraphEntry, src_sf: &SfAttachment) -> Emission {
        if Self::is_mac_attached(src_sf) {
            return self.ethernet.next_hop_sf_to_gateway(entry, src_sf);
        }
        // the match-any next hop already hands the packet to the egress flows
        Emission::not_required()
    }

    fn next_hop_sf_to_sff(&self, entry: &GraphEntry, _src_sf: &SfAttachment, dst_sff: Option<&ResolvedLocator>) -> Emission {
        if entry.dst.is_egress() {
            return Emission::not_required();
        }
        match dst_sff.and_then(ResolvedLocator::ip) {
            Some(ip) => self.tunnel_next_hop(entry, ip),
            None => Emission::missing("forwarder tunnel ip"),
        }
    }

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        if Self::is_mac_attached(dst_sf) {
            return self.ethernet.sf_transport_egress(entry, dst_sf);
        }
        let flow_match = self.nsh_match(entry).tun_dst(dst_sf.ip());
        let spec = if self.is_loopback(entry, dst_sf) {
            FlowSpec::new(FlowKind::SfTransportEgress, FlowTable::TransportEgress, priority::NSH_CONTEXT_EGRESS)
                .with_match(flow_match)
                .with_actions(vec![FlowAction::Output(Port::Local)])
        } else {
            FlowSpec::new(FlowKind::SfTransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(flow_match)
                .with_actions(vec![output_to(dst_sf.forwarder_port)])
        };
        Emission::one(spec)
    }

    fn sff_transport_egress(
        &self,
        entry: &GraphEntry,
        src_egress: Option<&ResolvedLocator>,
        _dst_ingress: Option<&ResolvedLocator>,
        hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        let Some(remote) = hop_ingress.and_then(ResolvedLocator::ip) else {
            return Emission::missing("next forwarder tunnel ip");
        };
        Emission::one(
            FlowSpec::new(FlowKind::TransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(self.nsh_match(entry).tun_dst(remote))
                .with_actions(vec![output_to(src_egress.and_then(|l| l.port))]),
        )
    }

    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        _src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        let egress_port = path_egress.and_then(|l| l.port);
        let app_table = FlowTable::Raw(self.ctx.config.app_coexistence_table);
        let local_ip = path_egress.and_then(ResolvedLocator::ip).or_else(|| {
            entry
                .src
                .name()
                .and_then(|name| self.ctx.forwarder(name))
                .and_then(|f| f.tunnel_ip())
        });

        let last_hop = FlowSpec::new(FlowKind::LastHopEgress, FlowTable::TransportEgress, priority::LAST_HOP_EGRESS)
            .with_match(self.nsh_match(entry).nsh_c1(0))
            .with_actions(vec![
                FlowAction::PopNsh,
                match egress_port {
                    Some(port) => FlowAction::Output(Port::Number(port)),
                    None => FlowAction::Resubmit(app_table),
                },
            ]);
        let nsh_context = FlowSpec::new(FlowKind::NshContextEgress, FlowTable::TransportEgress, priority::NSH_CONTEXT_EGRESS)
            .with_match(self.nsh_match(entry))
            .with_actions(vec![FlowAction::MoveNshC1ToTunnelDst, output_to(egress_port)]);
        let app_coexistence = FlowSpec::new(
            FlowKind::AppCoexistenceEgress,
            FlowTable::TransportEgress,
            priority::APP_COEXISTENCE_EGRESS,
        )
        .with_match(self.nsh_match(entry).tun_dst(local_ip))
        .with_actions(vec![FlowAction::PopNsh, FlowAction::Resubmit(app_table)]);

        Emission::Flows(vec![last_hop, nsh_context, app_coexistence])
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::super::SkipReason;
    use super::*;
    use crate::graph::ForwarderRef;
    use pretty_assertions::assert_eq;

    /// `sff-a` terminates tunnels on 10.0.0.1.
    fn fixture(accelerated_port: Option<u32>) -> fixtures::Fixture {
        let mut sff = fixtures::forwarder("sff-a", "openflow:1");
        sff.locators = vec![fixtures::ip_locator("a-vxlan", "10.0.0.1", Some(4))];
        sff.accelerated_port = accelerated_port;
        fixtures::Fixture::new(fixtures::model(vec![sff], vec![]))
    }

    fn to_sf() -> GraphEntry {
        fixtures::entry(ForwarderRef::Ingress, fixtures::sff("sff-a"), Some("sf1"), 255)
    }

    fn flows(emission: Emission) -> Vec<FlowSpec> {
        match emission {
            Emission::Flows(flows) => flows,
            Emission::Skipped(reason) => panic!("skipped: {reason:?}"),
        }
    }

    #[test]
    fn test_function_on_forwarder_address_loops_through_local_port() {
        let fixture = fixture(None);
        let tunnel = NshTunnel::new(fixture.ctx(5));
        let sf = fixtures::ip_sf("sf1", "10.0.0.1", None);

        let ingress = flows(tunnel.sf_transport_ingress(&to_sf(), &sf));
        assert_eq!(ingress[0].flow_match, FlowMatch::new().in_port(Port::Local).nsp(5));

        let egress = flows(tunnel.sf_transport_egress(&to_sf(), &sf));
        assert_eq!(egress[0].priority, priority::NSH_CONTEXT_EGRESS);
        assert_eq!(egress[0].actions, vec![FlowAction::Output(Port::Local)]);
    }

    #[test]
    fn test_accelerated_forwarder_never_loops_back() {
        let fixture = fixture(Some(9));
        let tunnel = NshTunnel::new(fixture.ctx(5));
        let sf = fixtures::ip_sf("sf1", "10.0.0.1", Some(6));

        assert_eq!(tunnel.sf_transport_ingress(&to_sf(), &sf), Emission::not_required());
        let egress = flows(tunnel.sf_transport_egress(&to_sf(), &sf));
        assert_eq!(egress[0].priority, priority::TRANSPORT_EGRESS);
        assert_eq!(egress[0].flow_match, FlowMatch::new().nsh(5, 255).tun_dst(fixtures::ip("10.0.0.1")));
        assert_eq!(egress[0].actions, vec![FlowAction::Output(Port::Number(6))]);
    }

    #[test]
    fn test_mac_attached_function_uses_ethernet_legs() {
        let fixture = fixture(None);
        let tunnel = NshTunnel::new(fixture.ctx(5));
        let sf = fixtures::mac_sf("sf1", "00:00:00:00:f1:01", None, Some(12));

        let next_hop = flows(tunnel.next_hop_sff_to_sf(&to_sf(), None, &sf));
        assert_eq!(
            next_hop[0].actions,
            vec![
                FlowAction::SetEthDst(fixtures::mac("00:00:00:00:f1:01")),
                goto(FlowTable::TransportEgress),
            ]
        );
        let ingress = flows(tunnel.sf_transport_ingress(&to_sf(), &sf));
        assert_eq!(ingress[0].flow_match, FlowMatch::new().in_port(Port::Number(12)).nsp(5));
        let egress = flows(tunnel.sf_transport_egress(&to_sf(), &sf));
        assert_eq!(
            egress[0].flow_match,
            FlowMatch::new().nsh(5, 255).eth_dst(fixtures::mac("00:00:00:00:f1:01"))
        );
    }

    #[test]
    fn test_function_to_forwarder_sets_tunnel_destination() {
        let fixture = fixture(None);
        let tunnel = NshTunnel::new(fixture.ctx(5));
        let sf = fixtures::ip_sf("sf1", "10.0.1.5", None);
        let across = fixtures::entry(fixtures::sff("sff-a"), fixtures::sff("sff-b"), Some("sf2"), 254);
        let remote = fixtures::resolved_ip("10.0.0.2", None);

        let next_hop = flows(tunnel.next_hop_sf_to_sff(&across, &sf, Some(&remote)));
        assert_eq!(
            next_hop[0].actions,
            vec![
                FlowAction::SetTunnelDst(fixtures::ip("10.0.0.2")),
                goto(FlowTable::TransportEgress),
            ]
        );
        assert_eq!(
            tunnel.next_hop_sf_to_sff(&across, &sf, None),
            Emission::Skipped(SkipReason::MissingLocator("forwarder tunnel ip"))
        );

        let to_gateway = fixtures::entry(fixtures::sff("sff-a"), ForwarderRef::Egress, None, 254);
        assert_eq!(tunnel.next_hop_sf_to_sff(&to_gateway, &sf, None), Emission::not_required());
    }

    #[test]
    fn test_terminal_falls_back_to_forwarder_tunnel_address() {
        let fixture = fixture(None);
        let tunnel = NshTunnel::new(fixture.ctx(5));
        let entry = fixtures::entry(fixtures::sff("sff-a"), ForwarderRef::Egress, None, 254);

        let specs = flows(tunnel.terminal_transport_egress(&entry, None, None));
        let kinds: Vec<FlowKind> = specs.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![FlowKind::LastHopEgress, FlowKind::NshContextEgress, FlowKind::AppCoexistenceEgress]
        );
        assert_eq!(specs[0].flow_match, FlowMatch::new().nsh(5, 254).nsh_c1(0));
        assert_eq!(specs[1].actions, vec![FlowAction::MoveNshC1ToTunnelDst, FlowAction::Output(Port::InPort)]);
        assert_eq!(specs[2].flow_match, FlowMatch::new().nsh(5, 254).tun_dst(fixtures::ip("10.0.0.1")));
    }
}
