use crate::model::{PathId, ResolvedLocator, ServiceIndex};
use crate::placement::PlacementId;
use serde::Serialize;
use std::fmt;

/// Endpoint of a graph entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForwarderRef {
    /// Where traffic enters the path.
    Ingress,
    /// Where traffic leaves the path.
    Egress,
    Forwarder(String),
}

impl ForwarderRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Forwarder(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_ingress(&self) -> bool {
        matches!(self, Self::Ingress)
    }

    pub fn is_egress(&self) -> bool {
        matches!(self, Self::Egress)
    }
}

impl fmt::Display for ForwarderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "INGRESS"),
            Self::Egress => write!(f, "EGRESS"),
            Self::Forwarder(name) => f.write_str(name),
        }
    }
}

/// One step of a path: traffic leaves `src` and is delivered to `sf` on
/// `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEntry {
    pub src: ForwarderRef,
    pub dst: ForwarderRef,
    /// Function served at `dst`. `None` on the final entry.
    pub sf: Option<String>,
    pub sf_group: Option<String>,
    /// Function served before this step.
    pub prev_sf: Option<String>,
    pub path_id: PathId,
    pub is_forward_path: bool,
    pub service_index: ServiceIndex,
    pub src_placement: Option<PlacementId>,
    pub dst_placement: Option<PlacementId>,
    /// Locator names chosen by the transport processor.
    pub src_egress_locator: Option<String>,
    pub dst_ingress_locator: Option<String>,
    /// Where traffic enters `dst` for this step.
    pub hop_ingress: Option<ResolvedLocator>,
    /// Where traffic leaves the path; set on the final entry only.
    pub path_egress: Option<ResolvedLocator>,
}

impl GraphEntry {
    /// Both endpoints are the same named forwarder.
    pub fn is_same_forwarder(&self) -> bool {
        matches!((self.src.name(), self.dst.name()), (Some(a), Some(b)) if a == b)
    }
}

/// Graph entries of one path, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderGraph {
    path_id: PathId,
    entries: Vec<GraphEntry>,
}

impl RenderGraph {
    pub(crate) fn new(path_id: PathId, entries: Vec<GraphEntry>) -> Self {
        Self { path_id, entries }
    }

    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [GraphEntry] {
        &mut self.entries
    }

    pub fn get(&self, index: usize) -> Option<&GraphEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// At least one function sits behind a placed logical interface.
    pub fn is_logical_mode(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.dst_placement.is_some() || e.src_placement.is_some())
    }

    /// Step between two functions on the same logical forwarder.
    pub fn is_intra_logical_hop(&self, index: usize) -> bool {
        self.is_logical_mode()
            && self.entries.get(index).is_some_and(GraphEntry::is_same_forwarder)
    }

    /// Intra-logical step whose functions live on different switches.
    pub fn is_cross_placement_hop(&self, index: usize) -> bool {
        self.is_intra_logical_hop(index)
            && self
                .entries
                .get(index)
                .is_some_and(|e| e.src_placement != e.dst_placement)
    }

    /// Forwarder, function and index of every hop, in order.
    pub fn hops(&self) -> Vec<(String, String, ServiceIndex)> {
        self.entries
            .iter()
            .filter_map(|e| Some((e.dst.name()?.to_string(), e.sf.clone()?, e.service_index)))
            .collect()
    }
}
