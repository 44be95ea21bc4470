//! Pieces shared by the physical transports.

use super::ProcessorContext;
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port};
use crate::graph::{ForwarderRef, RenderGraph};
use crate::model::{LocatorKind, PathId};
use sfc_types::MacAddress;

/// Names the locator each forwarder uses towards its neighbour on every
/// entry that crosses forwarders.
///
/// Where the path enters or leaves the chain, the forwarder's declared
/// ingress or egress locator is used, else one of `kind` without a peer.
pub(super) fn assign_forwarder_locators(ctx: &ProcessorContext<'_>, graph: &mut RenderGraph, kind: LocatorKind) {
    for entry in graph.entries_mut() {
        if entry.is_same_forwarder() {
            continue;
        }
        let src_name = entry.src.name().map(str::to_string);
        let dst_name = entry.dst.name().map(str::to_string);

        if let Some(src) = src_name.as_deref().and_then(|name| ctx.forwarder(name)) {
            let locator = match &entry.dst {
                ForwarderRef::Egress => src.edge_locator(kind, src.egress_locator.as_deref()),
                _ => src.locator_towards(kind, dst_name.as_deref()),
            };
            entry.src_egress_locator = locator.map(|l| l.name.clone());
        }
        if let Some(dst) = dst_name.as_deref().and_then(|name| ctx.forwarder(name)) {
            let locator = match &entry.src {
                ForwarderRef::Ingress => dst.edge_locator(kind, dst.ingress_locator.as_deref()),
                _ => dst.locator_towards(kind, src_name.as_deref()),
            };
            entry.dst_ingress_locator = locator.map(|l| l.name.clone());
        }
    }
}

/// Resolves the named locators into hop-ingress and path-egress values.
///
/// Entries between two functions on the same forwarder are left alone.
pub(super) fn compute_hop_locators(ctx: &ProcessorContext<'_>, graph: &mut RenderGraph) {
    for entry in graph.entries_mut() {
        if entry.is_same_forwarder() {
            continue;
        }
        match &entry.dst {
            ForwarderRef::Egress => {
                entry.path_egress = entry
                    .src
                    .name()
                    .zip(entry.src_egress_locator.as_deref())
                    .and_then(|(forwarder, locator)| ctx.forwarder_locator(forwarder, locator));
            }
            ForwarderRef::Forwarder(dst) => {
                entry.hop_ingress = entry
                    .dst_ingress_locator
                    .as_deref()
                    .and_then(|locator| ctx.forwarder_locator(dst, locator));
            }
            ForwarderRef::Ingress => {}
        }
    }
}

pub(super) fn path_metadata(path_id: PathId) -> u64 {
    u64::from(path_id)
}

pub(super) fn goto(table: FlowTable) -> FlowAction {
    FlowAction::GotoTable(table)
}

/// Output port, or back out of the port the packet came in on.
pub(super) fn output_to(port: Option<u32>) -> FlowAction {
    FlowAction::Output(port.map_or(Port::InPort, Port::Number))
}

/// Next hop keyed by path metadata and source MAC that rewrites the
/// destination MAC when one is known.
pub(super) fn mac_next_hop(path_id: PathId, src: Option<MacAddress>, dst: Option<MacAddress>) -> FlowSpec {
    let mut actions = Vec::with_capacity(2);
    if let Some(dst) = dst {
        actions.push(FlowAction::SetEthDst(dst));
    }
    actions.push(goto(FlowTable::TransportEgress));
    let priority = match src {
        Some(_) => priority::NEXT_HOP,
        None => priority::NEXT_HOP_ANY_SOURCE,
    };
    FlowSpec::new(FlowKind::NextHop, FlowTable::NextHop, priority)
        .with_match(FlowMatch::new().metadata(path_metadata(path_id)).eth_src(src))
        .with_actions(actions)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mac_next_hop_without_destination() {
        let src: MacAddress = "00:00:00:00:00:0a".parse().unwrap();
        let spec = mac_next_hop(4, Some(src), None);
        assert_eq!(spec.flow_match, FlowMatch::new().metadata(4).eth_src(src));
        assert_eq!(spec.actions, vec![FlowAction::GotoTable(FlowTable::TransportEgress)]);
    }

    #[test]
    fn test_mac_next_hop_without_source_yields() {
        let dst: MacAddress = "00:00:00:00:00:0b".parse().unwrap();
        let spec = mac_next_hop(4, None, Some(dst));
        assert_eq!(spec.priority, priority::NEXT_HOP_ANY_SOURCE);
        assert!(spec.priority < mac_next_hop(4, Some(dst), None).priority);
        assert_eq!(spec.flow_match, FlowMatch::new().metadata(4));
    }

    #[test]
    fn test_edge_locators_use_declared_names() {
        let mut sff = fixtures::forwarder("sff-a", "openflow:1");
        sff.locators = vec![
            fixtures::mac_locator("a-b", "02:00:00:00:0a:01", Some(10), Some("sff-b")),
            fixtures::mac_locator("a-edge", "02:00:00:00:0a:00", Some(11), None),
            fixtures::mac_locator("a-in", "02:00:00:00:0a:02", Some(12), None),
        ];
        sff.ingress_locator = Some("a-in".to_string());
        let model = fixtures::model(vec![sff], vec![]);
        let fixture = fixtures::Fixture::new(model);
        let ctx = fixture.ctx(1);

        let mut graph = fixtures::graph(vec![
            fixtures::entry(ForwarderRef::Ingress, fixtures::sff("sff-a"), Some("sf1"), 255),
            fixtures::entry(fixtures::sff("sff-a"), ForwarderRef::Egress, None, 254),
        ]);
        assign_forwarder_locators(&ctx, &mut graph, LocatorKind::Mac);

        let entries = graph.entries();
        assert_eq!(entries[0].dst_ingress_locator.as_deref(), Some("a-in"));
        assert_eq!(entries[1].src_egress_locator.as_deref(), Some("a-edge"));
    }

    #[test]
    fn test_edge_locator_never_borrows_a_link() {
        let mut sff = fixtures::forwarder("sff-a", "openflow:1");
        sff.locators = vec![fixtures::mac_locator("a-b", "02:00:00:00:0a:01", Some(10), Some("sff-b"))];
        let fixture = fixtures::Fixture::new(fixtures::model(vec![sff], vec![]));

        let mut graph = fixtures::graph(vec![fixtures::entry(
            ForwarderRef::Ingress,
            fixtures::sff("sff-a"),
            Some("sf1"),
            255,
        )]);
        assign_forwarder_locators(&fixture.ctx(1), &mut graph, LocatorKind::Mac);
        assert_eq!(graph.entries()[0].dst_ingress_locator, None);
    }

    #[test]
    fn test_output_to_defaults_to_in_port() {
        assert_eq!(output_to(None), FlowAction::Output(Port::InPort));
        assert_eq!(output_to(Some(3)), FlowAction::Output(Port::Number(3)));
    }
}
