//! Flow table model and the sink flows are committed to.

mod sink;
mod types;

pub use sink::{FlowSink, FlowSinkError, InMemoryFlowSink, StagedFlows};
pub use types::{
    priority, FlowAction, FlowEntry, FlowKey, FlowKind, FlowMatch, FlowOwner, FlowSpec, FlowTable,
    NodeId, Port, TableIndex, ETH_TYPE_MPLS, ETH_TYPE_NSH,
};
