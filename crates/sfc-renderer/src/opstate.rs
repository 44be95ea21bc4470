//! Operational state notifications for rendered paths.
//!
//! Notifications are best effort. They are delivered after a render has
//! been committed and never block or fail the render.

use crate::graph::RenderGraph;
use crate::model::{PathId, RenderedServicePath, ServiceIndex};
use crate::placement::PlacementId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopState {
    pub forwarder: String,
    pub service_function: String,
    pub service_index: ServiceIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OperationalEvent {
    Rendered {
        path_id: PathId,
        name: String,
        hops: Vec<HopState>,
    },
    Removed {
        path_id: PathId,
        name: String,
    },
}

impl OperationalEvent {
    pub fn rendered(rsp: &RenderedServicePath, graph: &RenderGraph) -> Self {
        let hops = graph
            .entries()
            .iter()
            .filter_map(|e| {
                Some(HopState {
                    forwarder: e.dst.name()?.to_string(),
                    service_function: e.sf.clone()?,
                    service_index: e.service_index,
                    placement: e.dst_placement,
                })
            })
            .collect();
        Self::Rendered {
            path_id: rsp.path_id,
            name: rsp.name.clone(),
            hops,
        }
    }

    pub fn path_id(&self) -> PathId {
        match self {
            Self::Rendered { path_id, .. } | Self::Removed { path_id, .. } => *path_id,
        }
    }
}

pub trait OperationalStateSink: Send + Sync {
    fn on_create(&self, rsp: &RenderedServicePath, graph: &RenderGraph);

    fn on_delete(&self, rsp: &RenderedServicePath);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOperationalSink;

impl OperationalStateSink for NullOperationalSink {
    fn on_create(&self, _rsp: &RenderedServicePath, _graph: &RenderGraph) {}

    fn on_delete(&self, _rsp: &RenderedServicePath) {}
}

/// Queues notifications on an unbounded channel for an async consumer.
#[derive(Debug, Clone)]
pub struct ChannelOperationalSink {
    tx: mpsc::UnboundedSender<OperationalEvent>,
}

impl ChannelOperationalSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OperationalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: OperationalEvent) {
        let path_id = event.path_id();
        if self.tx.send(event).is_err() {
            debug!(path_id, "Operational state consumer is gone, dropping event");
        }
    }
}

impl OperationalStateSink for ChannelOperationalSink {
    fn on_create(&self, rsp: &RenderedServicePath, graph: &RenderGraph) {
        self.send(OperationalEvent::rendered(rsp, graph));
    }

    fn on_delete(&self, rsp: &RenderedServicePath) {
        self.send(OperationalEvent::Removed {
            path_id: rsp.path_id,
            name: rsp.name.clone(),
        });
    }
}

/// Logs every event until all senders are dropped. Returns the number of
/// events seen.
pub async fn log_operational_events(mut rx: mpsc::UnboundedReceiver<OperationalEvent>) -> usize {
    let mut seen = 0usize;
    while let Some(event) = rx.recv().await {
        seen = seen.saturating_add(1);
        match serde_json::to_string(&event) {
            Ok(json) => info!(path_id = event.path_id(), event = %json, "Operational state update"),
            Err(e) => debug!(path_id = event.path_id(), error = %e, "Failed to serialize operational event"),
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::model::{Direction, Encapsulation, InMemoryModel, RspHop, TransportType};
    use crate::placement::NoPlacement;

    fn rsp() -> RenderedServicePath {
        RenderedServicePath {
            name: "web".to_string(),
            path_id: 3,
            hops: vec![RspHop {
                forwarder: "sff1".to_string(),
                service_function: "fw".to_string(),
                sf_group: None,
                service_index: 255,
            }],
            transport: TransportType::VxlanGpe,
            encapsulation: Encapsulation::Nsh,
            starting_index: 255,
            direction: Direction::Forward,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_events() {
        let (sink, rx) = ChannelOperationalSink::new();
        let rsp = rsp();
        let graph = build_graph(&rsp, &InMemoryModel::new(), &NoPlacement).unwrap();

        sink.on_create(&rsp, &graph);
        sink.on_delete(&rsp);
        drop(sink);

        assert_eq!(log_operational_events(rx).await, 2);
    }

    #[test]
    fn test_rendered_event_lists_hops() {
        let rsp = rsp();
        let graph = build_graph(&rsp, &InMemoryModel::new(), &NoPlacement).unwrap();
        let OperationalEvent::Rendered { hops, .. } = OperationalEvent::rendered(&rsp, &graph) else {
            panic!("expected rendered event");
        };
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].service_function, "fw");
    }

    #[test]
    fn test_send_after_consumer_dropped() {
        let (sink, rx) = ChannelOperationalSink::new();
        drop(rx);
        sink.on_delete(&rsp());
    }
}
