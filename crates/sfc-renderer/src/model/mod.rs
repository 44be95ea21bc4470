//! Read-only view of the service chain model.
//!
//! The renderer never persists chain or topology state. Everything it needs
//! about forwarders, service functions and their locators is looked up
//! through [`ModelReader`], scoped to the path currently being rendered.

mod memory;
mod reader;
mod types;

pub use memory::{InMemoryModel, ModelSnapshot};
pub use reader::{Adjacency, InFlightGuard, ModelReader};
pub use types::{
    DataPlaneLocator, Direction, Encapsulation, ForwarderLocator, LocatorKind, PathId,
    RenderedServicePath, ResolvedLocator, RspHop, ServiceFunction, ServiceFunctionForwarder,
    ServiceIndex, SfAttachment, SfDictionaryEntry, SfLocator, TransportType,
};
