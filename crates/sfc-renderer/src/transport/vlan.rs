//! VLAN tags between forwarders.
//!
//! Each hop between forwarders gets a VLAN id from the configured range.
//! Ids come from a [`VlanPool`] owned by the renderer and stay with their
//! path until it is deleted. Function-facing legs are the same as MPLS and
//! are delegated to it.

use super::common::{assign_forwarder_locators, compute_hop_locators, goto, output_to, path_metadata};
use super::mpls::Mpls;
use super::{Emission, ProcessorContext, TransportProcessor, TransportVariant};
use crate::config::VlanRange;
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable};
use crate::graph::{GraphEntry, RenderGraph};
use crate::model::{DataPlaneLocator, LocatorKind, PathId, RenderedServicePath, ResolvedLocator, SfAttachment};
use crate::renderer::RenderError;
use sfc_types::VlanId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::PoisonError;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct VlanLease {
    ids: Vec<VlanId>,
    committed: bool,
}

/// VLAN ids held by live paths.
///
/// A path keeps its ids across renders until it is released, so rendering
/// it again reuses them and no two live paths are handed the same id.
#[derive(Debug)]
pub struct VlanPool {
    range: VlanRange,
    leases: BTreeMap<PathId, VlanLease>,
}

impl VlanPool {
    pub fn new(range: VlanRange) -> Self {
        Self {
            range,
            leases: BTreeMap::new(),
        }
    }

    /// `count` ids for `path_id`, lowest free ids first. Slots past the end
    /// of the range are `None`.
    pub fn lease(&mut self, path_id: PathId, count: usize) -> Vec<Option<VlanId>> {
        let taken: BTreeSet<u16> = self
            .leases
            .values()
            .flat_map(|lease| lease.ids.iter().map(|id| id.as_u16()))
            .collect();
        let range = self.range;
        let lease = self.leases.entry(path_id).or_default();
        let missing = count.saturating_sub(lease.ids.len());
        let fresh: Vec<VlanId> = (range.start..=range.end)
            .filter(|id| !taken.contains(id))
            .filter_map(|id| VlanId::new(id).ok())
            .take(missing)
            .collect();
        lease.ids.extend(fresh);
        (0..count).map(|i| lease.ids.get(i).copied()).collect()
    }

    /// The flows using the ids of `path_id` were committed.
    pub fn commit(&mut self, path_id: PathId) {
        if let Some(lease) = self.leases.get_mut(&path_id) {
            lease.committed = true;
        }
    }

    /// Returns the ids of a path whose first render did not commit.
    pub fn abandon(&mut self, path_id: PathId) {
        if self.leases.get(&path_id).is_some_and(|lease| !lease.committed) {
            self.leases.remove(&path_id);
        }
    }

    /// Returns every id held by `path_id`.
    pub fn release(&mut self, path_id: PathId) -> usize {
        self.leases.remove(&path_id).map_or(0, |lease| lease.ids.len())
    }

    pub fn held(&self, path_id: PathId) -> Vec<VlanId> {
        self.leases
            .get(&path_id)
            .map(|lease| lease.ids.clone())
            .unwrap_or_default()
    }
}

pub struct Vlan<'a> {
    ctx: ProcessorContext<'a>,
    sf_legs: Mpls<'a>,
}

impl<'a> Vlan<'a> {
    pub fn new(ctx: ProcessorContext<'a>) -> Self {
        Self {
            ctx,
            sf_legs: Mpls::new(ctx),
        }
    }
}

fn unassigned_vlan(entry: &mut GraphEntry) -> Option<&mut Option<VlanId>> {
    match entry.hop_ingress.as_mut().map(|hop| &mut hop.locator) {
        Some(DataPlaneLocator::Mac { vlan, .. }) if vlan.is_none() => Some(vlan),
        _ => None,
    }
}

impl TransportProcessor for Vlan<'_> {
    fn variant(&self) -> TransportVariant {
        TransportVariant::Vlan
    }

    fn resolve_forwarder_locators(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
        assign_forwarder_locators(&self.ctx, graph, LocatorKind::Mac);
        Ok(())
    }

    fn compute_transport_values(&mut self, graph: &mut RenderGraph, _rsp: &RenderedServicePath) -> Result<(), RenderError> {
        compute_hop_locators(&self.ctx, graph);
        let needed = graph
            .entries_mut()
            .iter_mut()
            .filter_map(unassigned_vlan)
            .count();
        if needed == 0 {
            return Ok(());
        }
        let leased = self
            .ctx
            .vlans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lease(self.ctx.path_id, needed);
        debug!(path_id = self.ctx.path_id, ?leased, "Leased hop VLANs");

        let mut leased = leased.into_iter();
        for entry in graph.entries_mut() {
            let service_index = entry.service_index;
            let Some(vlan) = unassigned_vlan(entry) else {
                continue;
            };
            *vlan = leased.next().flatten();
            if vlan.is_none() {
                warn!(path_id = self.ctx.path_id, service_index, "VLAN range exhausted");
            }
        }
        Ok(())
    }

    fn sff_transport_ingress(&self, entry: &GraphEntry) -> Emission {
        let Some(vlan) = entry.hop_ingress.as_ref().and_then(ResolvedLocator::vlan) else {
            return Emission::missing("hop vlan");
        };
        Emission::one(
            FlowSpec::new(FlowKind::TransportIngress, FlowTable::TransportIngress, priority::TRANSPORT_INGRESS)
                .with_match(FlowMatch::new().vlan(vlan))
                .with_actions(vec![goto(FlowTable::PathMapper)]),
        )
    }

    fn sf_transport_ingress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        self.sf_legs.sf_transport_ingress(entry, dst_sf)
    }

    fn sff_path_mapper(&self, _entry: &GraphEntry, hop_ingress: Option<&ResolvedLocator>) -> Emission {
        let Some(vlan) = hop_ingress.and_then(ResolvedLocator::vlan) else {
            return Emission::missing("hop vlan");
        };
        Emission::one(
            FlowSpec::new(FlowKind::PathMapper, FlowTable::PathMapper, priority::PATH_MAPPER)
                .with_match(FlowMatch::new().vlan(vlan))
                .with_actions(vec![
                    FlowAction::PopVlan,
                    FlowAction::WriteMetadata(path_metadata(self.ctx.path_id)),
                    goto(FlowTable::NextHop),
                ]),
        )
    }

    fn sf_path_mapper(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        self.sf_legs.sf_path_mapper(entry, dst_sf)
    }

    fn next_hop_sff_to_sf(&self, entry: &GraphEntry, src_sff: Option<&ResolvedLocator>, dst_sf: &SfAttachment) -> Emission {
        self.sf_legs.next_hop_sff_to_sf(entry, src_sff, dst_sf)
    }

    fn next_hop_sf_to_sf(&self, entry: &GraphEntry, src_sf: &SfAttachment, dst_sf: &SfAttachment) -> Emission {
        self.sf_legs.next_hop_sf_to_sf(entry, src_sf, dst_sf)
    }

    fn next_hop_sf_to_sff(&self, entry: &GraphEntry, src_sf: &SfAttachment, dst_sff: Option<&ResolvedLocator>) -> Emission {
        self.sf_legs.next_hop_sf_to_sff(entry, src_sf, dst_sff)
    }

    fn sf_transport_egress(&self, entry: &GraphEntry, dst_sf: &SfAttachment) -> Emission {
        self.sf_legs.sf_transport_egress(entry, dst_sf)
    }

    fn sff_transport_egress(
        &self,
        _entry: &GraphEntry,
        src_egress: Option<&ResolvedLocator>,
        dst_ingress: Option<&ResolvedLocator>,
        hop_ingress: Option<&ResolvedLocator>,
    ) -> Emission {
        let Some(vlan) = hop_ingress.and_then(ResolvedLocator::vlan) else {
            return Emission::missing("hop vlan");
        };
        let mut actions: Vec<FlowAction> = src_egress
            .and_then(ResolvedLocator::mac)
            .map(FlowAction::SetEthSrc)
            .into_iter()
            .collect();
        actions.push(FlowAction::PushVlan(vlan));
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

    fn terminal_transport_egress(
        &self,
        entry: &GraphEntry,
        src_sf: Option<&SfAttachment>,
        path_egress: Option<&ResolvedLocator>,
    ) -> Emission {
        self.sf_legs.terminal_transport_egress(entry, src_sf, path_egress)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use pretty_assertions::assert_eq;

    fn range(start: u16, end: u16) -> VlanRange {
        VlanRange { start, end }
    }

    fn ids(pool: &VlanPool, path_id: PathId) -> Vec<u16> {
        pool.held(path_id).iter().map(|id| id.as_u16()).collect()
    }

    #[test]
    fn test_live_paths_get_distinct_ids() {
        let mut pool = VlanPool::new(range(100, 199));
        pool.lease(3, 2);
        pool.commit(3);
        pool.lease(4, 2);
        pool.commit(4);

        assert_eq!(ids(&pool, 3), vec![100, 101]);
        assert_eq!(ids(&pool, 4), vec![102, 103]);
    }

    #[test]
    fn test_rerender_reuses_path_ids() {
        let mut pool = VlanPool::new(range(100, 199));
        let first = pool.lease(3, 2);
        pool.commit(3);
        let again = pool.lease(3, 2);

        assert_eq!(first, again);
        assert_eq!(ids(&pool, 3), vec![100, 101]);
    }

    #[test]
    fn test_released_ids_are_handed_out_again() {
        let mut pool = VlanPool::new(range(100, 199));
        pool.lease(3, 2);
        pool.commit(3);
        pool.lease(4, 1);
        pool.commit(4);

        assert_eq!(pool.release(3), 2);
        assert_eq!(pool.release(3), 0);
        pool.lease(5, 1);
        assert_eq!(ids(&pool, 5), vec![100]);
    }

    #[test]
    fn test_abandon_keeps_committed_lease() {
        let mut pool = VlanPool::new(range(100, 199));
        pool.lease(3, 1);
        pool.abandon(3);
        assert!(pool.held(3).is_empty());

        pool.lease(4, 1);
        pool.commit(4);
        pool.abandon(4);
        assert_eq!(ids(&pool, 4), vec![100]);
    }

    #[test]
    fn test_exhausted_range_leaves_slots_empty() {
        let mut pool = VlanPool::new(range(100, 101));
        pool.lease(3, 1);
        let leased = pool.lease(4, 2);

        assert_eq!(leased, vec![Some(fixtures::vlan(101)), None]);
    }

    #[test]
    fn test_egress_between_forwarders_sets_source_mac() {
        let fixture = fixtures::Fixture::empty();
        let vlan = Vlan::new(fixture.ctx(3));
        let entry = fixtures::entry(fixtures::sff("sff-a"), fixtures::sff("sff-b"), Some("sf2"), 254);
        let src = fixtures::resolved_mac("02:00:00:00:0a:01", Some(10));
        let dst = fixtures::resolved_mac("02:00:00:00:0b:01", Some(20));
        let mut hop = dst.clone();
        hop.locator = DataPlaneLocator::Mac {
            mac: fixtures::mac("02:00:00:00:0b:01"),
            vlan: Some(fixtures::vlan(101)),
        };

        let Emission::Flows(flows) = vlan.sff_transport_egress(&entry, Some(&src), Some(&dst), Some(&hop)) else {
            panic!("expected flows");
        };
        assert_eq!(
            flows[0].actions,
            vec![
                FlowAction::SetEthSrc(fixtures::mac("02:00:00:00:0a:01")),
                FlowAction::PushVlan(fixtures::vlan(101)),
                FlowAction::Output(crate::flow::Port::Number(10)),
            ]
        );
    }
}

