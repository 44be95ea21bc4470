//! Forwarders addressed through tenant-network interfaces.
//!
//! Switch identity and tunnels between switches come from the placement
//! resolver. Flows use the externally owned table chain configured in
//! `logical_tables` and hand packets back to its dispatcher table.

use super::common::goto;
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port, TableIndex};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{DataPlaneLocator, RenderedServicePath, ResolvedLocator, SfAttachment};
use crate::renderer::RenderError;
use tracing::warn;

pub struct LogicalForwarder<'a> {
    ctx: ProcessorContext<'a>,
}

impl<'a> LogicalForwarder<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self { ctx }
    }

    fn nsh_match(&self, entry: &GraphEntry) -> FlowMatch {
        FlowMatch::new().nsh(self.ctx.path_id, entry.service_index)
    }

    fn deliver_to_sf(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let mut actions = Vec::with_capacity(2);
        if let Some(mac) = dst_sf.mac() {
            actions.push(FlowAction::SetEthDst(mac));
        }
        actions.push(goto(FlowTable::TransportEgress));
        Emission::one(
            FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority::NEXT_HOP)
                .with_match(self.nsh_match(entry))
                .with_actions(actions),
        )
    }
}

impl TransportProcessor for LogicalForwarder<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::LogicalForwarder
    }

    /// Cross-placement hops leave through the tunnel port between the two
    /// switches.
    fn compute_transport_values(&mut self, graph: &mut RenderGraph, _rsp: &RenderedServicePath) -> Result<(), RenderError> {
        for entry in graph.entries_mut() {
            let (Some(src), Some(dst)) = (entry.src_placement, entry.dst_placement) else {
                continue;
            };
            if src == dst {
                continue;
            }
            match self.ctx.placement.tunnel_interface(src, dst) {
                Ok(interface) => {
                    entry.hop_ingress = Some(ResolvedLocator::new(DataPlaneLocator::LogicalInterface {
                        interface,
                        mac: None,
                    }));
                }
                Err(e) => {
                    warn!(path_id = self.ctx.path_id, %src, %dst, error = %e, "No tunnel between placements");
                }
            }
        }
        Ok(())
    }

    fn table_index_override(&self) -> Option<TableIndex> {
        Some(self.ctx.config.logical_tables.table_index())
    }

    fn sff_transport_ingress(&self, entry: &GraphEntry) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::TransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![goto(FlowTable::NextHop)]),
        )
    }

    fn sf_transport_ingress(&self, _entry: &GraphEntry, _dst_sf: &SfAttachment) -> Emission {
        Emission::not_required()
    }

    fn sff_path_mapper(&self, _entry: &GraphEntry, _hop_ingress: Option<&ResolvedLocator>) -> Emission {
        Emission::not_required()
    }

    fn sf_path_mapper(&self, _entry: &GraphEntry, _dst_sf: &SfAttachment) -> Emission {
        Emission::not_required()
    }

    fn next_hop_sff_to_sf(&self, entry: &GraphEntry, _src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        self.deliver_to_sf(entry, dst_sf)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, _src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        self.deliver_to_sf(entry, dst_sf)
    }

    fn next_hop_sf_to_sff(&self, _entry: &GraphEntry, _src_sf: &SfAttachment, _dst_sff: Option<&ResolvedLocator>) -> Emission {
        Emission::not_required()
    }

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        let Some(interface) = dst_sf.interface() else {
            return Emission::missing("service function logical interface");
        };
        Emission::one(
            FlowSpec::new(FlowKind::SfTransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![FlowAction::Output(Port::Interface(interface.to_string()))]),
        )
    }

    fn sff_transport_egress(
        &self,
        entry: &GraphEntry,
        _src_egress: Option<&ResolvedLocator>,
        _dst_ingress: Option<&ResolvedLocator>,
        hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        let Some(tunnel) = hop_ingress.and_then(ResolvedLocator::interface) else {
            return Emission::missing("placement tunnel interface");
        };
        Emission::one(
            FlowSpec::new(FlowKind::TransportEgress, FlowTable::TransportEgress, priority::TRANSPORT_EGRESS)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![FlowAction::Output(Port::Interface(tunnel.to_string()))]),
        )
    }

    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        _src_sf: Option<&SfAttachment>,
        _path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        Emission::one(
            FlowSpec::new(FlowKind::LastHopEgress, FlowTable::TransportEgress, priority::LAST_HOP_EGRESS)
                .with_match(self.nsh_match(entry))
                .with_actions(vec![
                    FlowAction::PopNsh,
                    FlowAction::Resubmit(FlowTable::Raw(self.ctx.config.logical_tables.dispatcher)),
                ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use crate::graph::ForwarderRef;
    use crate::model::{Direction, Encapsulation, TransportType};
    use crate::placement::{PlacementId, StaticPlacementResolver};
    use pretty_assertions::assert_eq;

    fn placed(src: u64, dst: u64) -> GraphEntry {
        let mut entry = fixtures::entry(fixtures::sff("sff-1"), fixtures::sff("sff-1"), Some("sf2"), 254);
        entry.src_placement = Some(PlacementId(src));
        entry.dst_placement = Some(PlacementId(dst));
        entry
    }

    fn rsp() -> RenderedServicePath {
        RenderedServicePath {
            name: "rsp-logical".to_string(),
            path_id: 9,
            hops: vec![],
            transport: TransportType::Function,
            encapsulation: Encapsulation::Nsh,
            starting_index: 255,
            direction: Direction::Forward,
        }
    }

    #[test]
    fn test_logical_tables_replace_standard_ones() {
        let fixture = fixtures::Fixture::empty();
        let logical = LogicalForwarder::new(fixture.ctx(9));
        let tables = logical.table_index_override().unwrap();

        assert_eq!(tables, fixture.config.logical_tables.table_index());
        assert_eq!(tables.next_hop, 86);
    }

    #[test]
    fn test_cross_placement_hop_leaves_through_tunnel() {
        let fixture = fixtures::Fixture::empty()
            .with_placement(StaticPlacementResolver::new().with_tunnel(PlacementId(11), PlacementId(12), "vxlan-12"));
        let mut logical = LogicalForwarder::new(fixture.ctx(9));
        let mut graph = fixtures::graph(vec![placed(11, 11), placed(11, 12), placed(12, 11)]);

        logical.compute_transport_values(&mut graph, &rsp()).unwrap();
        let entries = graph.entries();
        assert_eq!(entries[0].hop_ingress, None);
        assert_eq!(entries[2].hop_ingress, None);

        let Emission::Flows(specs) =
            logical.sff_transport_egress(&entries[1], None, None, entries[1].hop_ingress.as_ref())
        else {
            panic!("expected flows");
        };
        assert_eq!(specs[0].actions, vec![FlowAction::Output(Port::Interface("vxlan-12".to_string()))]);
        assert_eq!(
            logical.sff_transport_egress(&entries[2], None, None, None),
            Emission::missing("placement tunnel interface")
        );
    }

    #[test]
    fn test_terminal_hands_back_to_dispatcher() {
        let fixture = fixtures::Fixture::empty();
        let logical = LogicalForwarder::new(fixture.ctx(9));
        let entry = fixtures::entry(fixtures::sff("sff-1"), ForwarderRef::Egress, None, 253);

        let Emission::Flows(specs) = logical.terminal_transport_egress(&entry, None, None) else {
            panic!("expected flows");
        };
        assert_eq!(specs[0].flow_match, FlowMatch::new().nsh(9, 253));
        assert_eq!(
            specs[0].actions,
            vec![FlowAction::PopNsh, FlowAction::Resubmit(FlowTable::Raw(17))]
        );
    }

    #[test]
    fn test_delivery_to_logical_interface() {
        let fixture = fixtures::Fixture::empty();
        let logical = LogicalForwarder::new(fixture.ctx(9));
        let entry = placed(11, 11);
        let sf = fixtures::logical_sf("sf2", "tap-2", Some("00:00:00:00:f2:01"));

        let Emission::Flows(specs) = logical.sf_transport_egress(&entry, &sf) else {
            panic!("expected flows");
        };
        assert_eq!(specs[0].actions, vec![FlowAction::Output(Port::Interface("tap-2".to_string()))]);
        let Emission::Flows(specs) = logical.next_hop_sf_to_sf(&entry, &sf, &sf) else {
            panic!("expected flows");
        };
        assert_eq!(specs[0].actions[0], FlowAction::SetEthDst(fixtures::mac("00:00:00:00:f2:01")));
    }
}
