use super::types::{
    Direction, PathId, ResolvedLocator, ServiceFunction, ServiceFunctionForwarder, SfAttachment,
};
use crate::flow::NodeId;
use crate::placement::PlacementId;

/// Layer-2 link between two adjacent forwarders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency {
    /// Locator on the upstream forwarder.
    pub local: ResolvedLocator,
    /// Locator on the downstream forwarder.
    pub remote: ResolvedLocator,
}

/// Lookups the renderer performs against the service chain model.
///
/// Only the two primitive lookups are required. The derived lookups have
/// default implementations over the forwarder and service function objects
/// so that test doubles stay small.
pub trait ModelReader: Send + Sync {
    fn service_function(&self, name: &str, path_id: PathId) -> Option<ServiceFunction>;

    fn forwarder(&self, name: &str, path_id: PathId) -> Option<ServiceFunctionForwarder>;

    /// Records that `path_id` is being rendered.
    fn mark_in_flight(&self, _path_id: PathId) {}

    fn clear_in_flight(&self, _path_id: PathId) {}

    fn forwarder_locator(
        &self,
        forwarder: &ServiceFunctionForwarder,
        locator_name: &str,
    ) -> Option<ResolvedLocator> {
        forwarder.locator(locator_name).map(ResolvedLocator::from)
    }

    /// Locator the forwarder sends to when delivering traffic into `sf`.
    fn ingress_sf_locator(
        &self,
        forwarder: &ServiceFunctionForwarder,
        sf: &ServiceFunction,
        direction: Direction,
    ) -> Option<SfAttachment> {
        sf_attachment(forwarder, sf, direction, true)
    }

    /// Locator traffic arrives from when it comes back out of `sf`.
    fn egress_sf_locator(
        &self,
        forwarder: &ServiceFunctionForwarder,
        sf: &ServiceFunction,
        direction: Direction,
    ) -> Option<SfAttachment> {
        sf_attachment(forwarder, sf, direction, false)
    }

    /// Maps a forwarder to the switch its flows are written to.
    ///
    /// A placement, when present, wins over the configured node identity.
    fn forwarder_node_identity(
        &self,
        forwarder: &str,
        path_id: PathId,
        placement: Option<PlacementId>,
    ) -> Option<NodeId> {
        if let Some(placement) = placement {
            return Some(NodeId::from_placement(placement));
        }
        self.forwarder(forwarder, path_id).and_then(|f| f.node_id)
    }

    /// Link between `src` and `dst`, found through locators that name each
    /// other as peer.
    fn forwarder_adjacency(&self, src: &str, dst: &str, path_id: PathId) -> Option<Adjacency> {
        let upstream = self.forwarder(src, path_id)?;
        let downstream = self.forwarder(dst, path_id)?;
        let local = upstream
            .locators
            .iter()
            .find(|l| l.peer.as_deref() == Some(dst))?;
        let remote = downstream
            .locators
            .iter()
            .find(|l| l.peer.as_deref() == Some(src) && l.locator.kind() == local.locator.kind())?;
        Some(Adjacency {
            local: local.into(),
            remote: remote.into(),
        })
    }
}

fn sf_attachment(
    forwarder: &ServiceFunctionForwarder,
    sf: &ServiceFunction,
    direction: Direction,
    towards_sf: bool,
) -> Option<SfAttachment> {
    let entry = forwarder.dictionary_entry(&sf.name)?;
    let ingress = entry.ingress_locator.as_str();
    let egress = entry.egress_locator.as_deref().unwrap_or(ingress);
    let name = match (direction, towards_sf) {
        (Direction::Forward, true) | (Direction::Reverse, false) => ingress,
        (Direction::Forward, false) | (Direction::Reverse, true) => egress,
    };
    let locator = sf.locator(name)?;
    Some(SfAttachment {
        service_function: sf.name.clone(),
        locator_name: locator.name.clone(),
        locator: locator.locator.clone(),
        forwarder_port: entry.port,
        forwarder_mac: entry.mac,
        l2_transparent: sf.l2_transparent,
    })
}

/// Keeps a path marked in flight for as long as the guard lives.
pub struct InFlightGuard<'a> {
    model: &'a dyn ModelReader,
    path_id: PathId,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(model: &'a dyn ModelReader, path_id: PathId) -> Self {
        model.mark_in_flight(path_id);
        Self { model, path_id }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.model.clear_in_flight(self.path_id);
    }
}
