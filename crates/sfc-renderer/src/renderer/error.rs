use crate::flow::FlowSinkError;
use crate::model::{Encapsulation, PathId, TransportType};
use crate::placement::PlacementId;
use thiserror::Error;

/// Reasons a render or delete fails. No flows from a failed render are
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("service function {service_function} is placed on {} switches: {placements:?}", .placements.len())]
    AmbiguousPlacement {
        service_function: String,
        placements: Vec<PlacementId>,
    },

    #[error("no transport processor for {transport} transport with {encapsulation} encapsulation")]
    NoTransportProcessor {
        transport: TransportType,
        encapsulation: Encapsulation,
    },

    #[error("forwarder {forwarder} has no switch identity")]
    UnresolvedForwarderIdentity { forwarder: String },

    #[error("path {path_id} is malformed: {reason}")]
    MalformedPath { path_id: PathId, reason: String },

    #[error(transparent)]
    FlowSink(#[from] FlowSinkError),
}

impl RenderError {
    /// Short label used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AmbiguousPlacement { .. } => "ambiguous-placement",
            Self::NoTransportProcessor { .. } => "no-transport-processor",
            Self::UnresolvedForwarderIdentity { .. } => "unresolved-forwarder-identity",
            Self::MalformedPath { .. } => "malformed-path",
            Self::FlowSink(_) => "flow-sink",
        }
    }

    pub(crate) fn malformed(path_id: PathId, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path_id,
            reason: reason.into(),
        }
    }
}
