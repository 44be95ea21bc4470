//! Hop-by-hop graph of a rendered service path.

mod builder;
mod types;

pub use builder::build_graph;
pub use types::{ForwarderRef, GraphEntry, RenderGraph};
