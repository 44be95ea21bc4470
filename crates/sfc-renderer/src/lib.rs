//! SFC flow renderer.
//!
//! Compiles a rendered service path (an ordered chain of service function
//! hops across forwarders) into the flow-table entries that steer packets
//! through it. Supported encapsulations are NSH over VXLAN-GPE, NSH over
//! Ethernet, MPLS, VLAN, MAC chaining and logical-interface forwarding.
//!
//! ```text
//! RenderedServicePath ──▶ build_graph ──▶ RenderGraph
//!                                            │
//!                       TransportProcessor ◀─┤ RspRenderer
//!                                            ▼
//!                                   StagedFlows ──▶ FlowSink
//! ```

pub mod audit;
pub mod config;
pub mod flow;
pub mod graph;
pub mod model;
pub mod opstate;
pub mod placement;
pub mod renderer;
pub mod transport;

pub use config::{ConfigError, RendererConfig};
pub use flow::{FlowEntry, FlowSink, FlowSinkError, InMemoryFlowSink, NodeId};
pub use graph::{build_graph, RenderGraph};
pub use model::{InMemoryModel, ModelReader, RenderedServicePath};
pub use opstate::{ChannelOperationalSink, OperationalEvent, OperationalStateSink};
pub use placement::{PlacementResolver, StaticPlacementResolver};
pub use renderer::{RenderError, RenderReport, RspRenderer};
