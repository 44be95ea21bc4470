use super::types::{ForwarderRef, GraphEntry, RenderGraph};
use crate::model::{ModelReader, RenderedServicePath};
use crate::placement::{PlacementError, PlacementId, PlacementResolver};
use crate::renderer::RenderError;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Builds the hop graph of `rsp`.
///
/// The first entry leaves `INGRESS`, one entry per hop follows, and a final
/// entry delivers to `EGRESS` with the last hop's index minus one.
pub fn build_graph(
    rsp: &RenderedServicePath,
    model: &dyn ModelReader,
    placement: &dyn PlacementResolver,
) -> Result<RenderGraph, RenderError> {
    validate_hops(rsp)?;

    let mut entries = Vec::with_capacity(rsp.hops.len() + 1);
    let mut prev_forwarder = ForwarderRef::Ingress;
    let mut prev_sf: Option<String> = None;
    let mut prev_placement: Option<PlacementId> = None;

    for hop in &rsp.hops {
        let dst_placement = resolve_sf_placement(rsp, &hop.service_function, model, placement)?;
        let dst = ForwarderRef::Forwarder(hop.forwarder.clone());
        entries.push(GraphEntry {
            src: prev_forwarder,
            dst: dst.clone(),
            sf: Some(hop.service_function.clone()),
            sf_group: hop.sf_group.clone(),
            prev_sf: prev_sf.take(),
            path_id: rsp.path_id,
            is_forward_path: rsp.is_forward_path(),
            service_index: hop.service_index,
            src_placement: prev_placement,
            dst_placement,
            src_egress_locator: None,
            dst_ingress_locator: None,
            hop_ingress: None,
            path_egress: None,
        });
        prev_forwarder = dst;
        prev_sf = Some(hop.service_function.clone());
        prev_placement = dst_placement;
    }

    // validate_hops guarantees at least one hop with index >= 1
    let last_index = rsp
        .hops
        .last()
        .and_then(|h| h.service_index.checked_sub(1))
        .ok_or_else(|| RenderError::malformed(rsp.path_id, "path has no egress service index"))?;
    entries.push(GraphEntry {
        src: prev_forwarder,
        dst: ForwarderRef::Egress,
        sf: None,
        sf_group: None,
        prev_sf,
        path_id: rsp.path_id,
        is_forward_path: rsp.is_forward_path(),
        service_index: last_index,
        src_placement: prev_placement,
        dst_placement: None,
        src_egress_locator: None,
        dst_ingress_locator: None,
        hop_ingress: None,
        path_egress: None,
    });

    debug!(path_id = rsp.path_id, entries = entries.len(), "Built render graph");
    Ok(RenderGraph::new(rsp.path_id, entries))
}

fn validate_hops(rsp: &RenderedServicePath) -> Result<(), RenderError> {
    if rsp.hops.is_empty() {
        return Err(RenderError::malformed(rsp.path_id, "path has no hops"));
    }
    let mut expected = rsp.starting_index;
    for (i, hop) in rsp.hops.iter().enumerate() {
        if hop.service_index != expected {
            return Err(RenderError::malformed(
                rsp.path_id,
                format!(
                    "hop {i} has service index {}, expected {expected}",
                    hop.service_index
                ),
            ));
        }
        expected = expected.checked_sub(1).ok_or_else(|| {
            RenderError::malformed(rsp.path_id, format!("hop {i} has service index 0"))
        })?;
    }
    Ok(())
}

/// Placement of a service function reachable only through logical
/// interfaces. `None` when it has other locators or none resolve.
fn resolve_sf_placement(
    rsp: &RenderedServicePath,
    sf_name: &str,
    model: &dyn ModelReader,
    resolver: &dyn PlacementResolver,
) -> Result<Option<PlacementId>, RenderError> {
    let Some(sf) = model.service_function(sf_name, rsp.path_id) else {
        warn!(path_id = rsp.path_id, sf = sf_name, "Service function not found in model");
        return Ok(None);
    };
    let Some(interfaces) = sf.logical_interfaces() else {
        return Ok(None);
    };

    let mut placements = BTreeSet::new();
    for interface in interfaces {
        match resolver.resolve_placement(interface) {
            Ok(p) => {
                placements.insert(p);
            }
            Err(PlacementError::NotFound(_)) => {
                warn!(path_id = rsp.path_id, sf = sf_name, interface, "Logical interface has no placement");
            }
            Err(e) => {
                warn!(path_id = rsp.path_id, sf = sf_name, interface, error = %e, "Placement lookup failed");
            }
        }
    }

    match placements.len() {
        0 | 1 => Ok(placements.into_iter().next()),
        _ => Err(RenderError::AmbiguousPlacement {
            service_function: sf_name.to_string(),
            placements: placements.into_iter().collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DataPlaneLocator, Direction, Encapsulation, InMemoryModel, RspHop, ServiceFunction, SfLocator,
        TransportType,
    };
    use crate::placement::{NoPlacement, StaticPlacementResolver};
    use pretty_assertions::assert_eq;

    fn rsp(hops: &[(&str, &str, u8)], starting_index: u8) -> RenderedServicePath {
        RenderedServicePath {
            name: "rsp-1".to_string(),
            path_id: 1,
            hops: hops
                .iter()
                .map(|(sff, sf, si)| RspHop {
                    forwarder: sff.to_string(),
                    service_function: sf.to_string(),
                    sf_group: None,
                    service_index: *si,
                })
                .collect(),
            transport: TransportType::VxlanGpe,
            encapsulation: Encapsulation::Nsh,
            starting_index,
            direction: Direction::Forward,
        }
    }

    fn logical_sf(name: &str, interfaces: &[&str]) -> ServiceFunction {
        ServiceFunction {
            name: name.to_string(),
            sf_type: "dpi".to_string(),
            locators: interfaces
                .iter()
                .map(|i| SfLocator {
                    name: i.to_string(),
                    locator: DataPlaneLocator::LogicalInterface {
                        interface: i.to_string(),
                        mac: None,
                    },
                })
                .collect(),
            l2_transparent: false,
        }
    }

    #[test]
    fn test_build_graph_sentinels_and_indexes() {
        let rsp = rsp(&[("sff1", "sf1", 255), ("sff1", "sf2", 254), ("sff2", "sf3", 253)], 255);
        let graph = build_graph(&rsp, &InMemoryModel::new(), &NoPlacement).unwrap();

        assert_eq!(graph.len(), 4);
        let first = &graph.entries()[0];
        assert_eq!(first.src, ForwarderRef::Ingress);
        assert_eq!(first.prev_sf, None);
        let last = &graph.entries()[3];
        assert_eq!(last.src, ForwarderRef::Forwarder("sff2".to_string()));
        assert_eq!(last.dst, ForwarderRef::Egress);
        assert_eq!(last.sf, None);
        assert_eq!(last.prev_sf.as_deref(), Some("sf3"));
        assert_eq!(last.service_index, 252);
        assert!(graph.entries()[1].is_same_forwarder());
        assert!(!graph.is_logical_mode());
    }

    #[test]
    fn test_build_graph_round_trip() {
        let hops = [("sff1", "sf1", 10), ("sff2", "sf2", 9)];
        let graph = build_graph(&rsp(&hops, 10), &InMemoryModel::new(), &NoPlacement).unwrap();
        let expected: Vec<_> = hops
            .iter()
            .map(|(a, b, si)| (a.to_string(), b.to_string(), *si))
            .collect();
        assert_eq!(graph.hops(), expected);
    }

    #[test]
    fn test_build_graph_rejects_bad_index() {
        let err = build_graph(
            &rsp(&[("sff1", "sf1", 255), ("sff2", "sf2", 250)], 255),
            &InMemoryModel::new(),
            &NoPlacement,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::MalformedPath { path_id: 1, .. }));

        let err = build_graph(&rsp(&[], 255), &InMemoryModel::new(), &NoPlacement).unwrap_err();
        assert!(matches!(err, RenderError::MalformedPath { .. }));

        let err = build_graph(&rsp(&[("sff1", "sf1", 0)], 0), &InMemoryModel::new(), &NoPlacement)
            .unwrap_err();
        assert!(matches!(err, RenderError::MalformedPath { .. }));
    }

    #[test]
    fn test_build_graph_placements() {
        let model = InMemoryModel::new()
            .with_service_function(logical_sf("sf1", &["tap-1"]))
            .with_service_function(logical_sf("sf2", &["tap-2", "tap-3"]));
        let resolver = StaticPlacementResolver::new()
            .with_interface("tap-1", PlacementId(1))
            .with_interface("tap-2", PlacementId(2))
            .with_interface("tap-3", PlacementId(2));

        let graph = build_graph(
            &rsp(&[("lsff", "sf1", 255), ("lsff", "sf2", 254)], 255),
            &model,
            &resolver,
        )
        .unwrap();

        let placements: Vec<_> = graph
            .entries()
            .iter()
            .map(|e| (e.src_placement, e.dst_placement))
            .collect();
        assert_eq!(
            placements,
            vec![
                (None, Some(PlacementId(1))),
                (Some(PlacementId(1)), Some(PlacementId(2))),
                (Some(PlacementId(2)), None),
            ]
        );
        assert!(graph.is_logical_mode());
        assert!(graph.is_intra_logical_hop(1));
        assert!(graph.is_cross_placement_hop(1));
        assert!(!graph.is_intra_logical_hop(0));
    }

    #[test]
    fn test_build_graph_ambiguous_placement() {
        let model = InMemoryModel::new().with_service_function(logical_sf("sf1", &["tap-1", "tap-2"]));
        let resolver = StaticPlacementResolver::new()
            .with_interface("tap-1", PlacementId(1))
            .with_interface("tap-2", PlacementId(2));

        let err = build_graph(&rsp(&[("lsff", "sf1", 255)], 255), &model, &resolver).unwrap_err();
        assert_eq!(
            err,
            RenderError::AmbiguousPlacement {
                service_function: "sf1".to_string(),
                placements: vec![PlacementId(1), PlacementId(2)],
            }
        );
    }
}
