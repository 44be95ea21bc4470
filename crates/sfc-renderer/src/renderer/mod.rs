//! Render and delete orchestration.

mod defaults;
mod error;
mod init;
mod orch;

pub use error::RenderError;
pub use init::ForwarderInitTable;
pub use orch::{RenderReport, RendererStats, RspRenderer, SkippedLeg};
