//! RspRenderer - compiles rendered service paths into flows.
//!
//! A render builds the hop graph, picks a transport processor, lets it
//! resolve per-path values, then walks the graph and stages flows for every
//! entry. Staged flows are committed in one batch or discarded as a whole.
//! Graph building and locator resolution happen outside the render lock;
//! emission, commit and deletion happen inside it.

use super::defaults::default_flows;
use super::error::RenderError;
use super::init::ForwarderInitTable;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::RendererConfig;
use crate::flow::{FlowOwner, FlowSink, NodeId, StagedFlows};
use crate::graph::{build_graph, ForwarderRef, GraphEntry, RenderGraph};
use crate::model::{
    Direction, InFlightGuard, ModelReader, PathId, RenderedServicePath, ResolvedLocator, SfAttachment,
};
use crate::opstate::{NullOperationalSink, OperationalStateSink};
use crate::placement::{NoPlacement, PlacementId, PlacementResolver};
use crate::transport::{
    select_variant, Emission, ProcessorContext, SkipReason, TransportKey, TransportProcessor,
    TransportVariant, VlanPool,
};
use serde::Serialize;
use sfc_types::VlanId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

const SOURCE: &str = "RspRenderer";

/// Counters kept across renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RendererStats {
    pub renders: u64,
    pub render_failures: u64,
    pub deletes: u64,
    pub flows_committed: u64,
    pub forwarders_initialized: u64,
    pub legs_skipped: u64,
}

/// A leg that produced no flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLeg {
    pub entry: usize,
    pub leg: &'static str,
    pub reason: SkipReason,
}

/// Outcome of a successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub path_id: PathId,
    pub variant: TransportVariant,
    pub logical_mode: bool,
    pub flows_committed: usize,
    /// Switches that received their default flows in this render.
    pub initialized_nodes: Vec<NodeId>,
    pub skipped: Vec<SkippedLeg>,
}

impl RenderReport {
    fn new(path_id: PathId, variant: TransportVariant, logical_mode: bool) -> Self {
        Self {
            path_id,
            variant,
            logical_mode,
            flows_committed: 0,
            initialized_nodes: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RenderState {
    init: ForwarderInitTable,
    stats: RendererStats,
}

/// Locators of one graph entry looked up in the model.
#[derive(Debug, Default)]
struct EntryLocators {
    /// How the function at `dst` is reached.
    dst_sf: Option<SfAttachment>,
    /// Where the previous function hands traffic back to `src`.
    src_sf: Option<SfAttachment>,
    src_egress: Option<ResolvedLocator>,
    dst_ingress: Option<ResolvedLocator>,
}

/// One graph entry with its switches and locators looked up.
struct EntryContext<'g> {
    index: usize,
    entry: &'g GraphEntry,
    dst_node: Option<NodeId>,
    src_node: Option<NodeId>,
    locators: EntryLocators,
}

/// Per-entry staging scratch.
struct Emitter<'r> {
    staged: StagedFlows,
    pending_init: BTreeSet<NodeId>,
    report: &'r mut RenderReport,
}

impl Emitter<'_> {
    fn stage(&mut self, node: &NodeId, index: usize, leg: &'static str, emission: Emission) {
        match emission {
            Emission::Flows(specs) => {
                for spec in specs {
                    self.staged.stage(node, spec);
                }
            }
            Emission::Skipped(reason) => {
                match reason {
                    SkipReason::Unsupported(_) => {
                        warn!(path_id = self.report.path_id, entry = index, leg, node = %node, %reason, "Leg skipped")
                    }
                    _ => debug!(path_id = self.report.path_id, entry = index, leg, node = %node, %reason, "Leg skipped"),
                }
                self.report.skipped.push(SkippedLeg {
                    entry: index,
                    leg,
                    reason,
                });
            }
        }
    }
}

pub struct RspRenderer {
    config: RendererConfig,
    model: Arc<dyn ModelReader>,
    sink: Arc<dyn FlowSink>,
    placement: Arc<dyn PlacementResolver>,
    opstate: Arc<dyn OperationalStateSink>,
    state: Mutex<RenderState>,
    vlans: Mutex<VlanPool>,
}

impl std::fmt::Debug for RspRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RspRenderer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RspRenderer {
    /// Renderer without logical interfaces and without operational state
    /// notifications.
    pub fn new(config: RendererConfig, model: Arc<dyn ModelReader>, sink: Arc<dyn FlowSink>) -> Self {
        let vlans = Mutex::new(VlanPool::new(config.vlan_range));
        Self {
            config,
            model,
            sink,
            placement: Arc::new(NoPlacement),
            opstate: Arc::new(NullOperationalSink),
            state: Mutex::new(RenderState::default()),
            vlans,
        }
    }

    pub fn with_placement_resolver(mut self, placement: Arc<dyn PlacementResolver>) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_operational_sink(mut self, opstate: Arc<dyn OperationalStateSink>) -> Self {
        self.opstate = opstate;
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> RendererStats {
        self.lock_state().stats.clone()
    }

    pub fn is_forwarder_initialized(&self, node: &NodeId) -> bool {
        self.lock_state().init.is_initialized(node)
    }

    pub fn initialized_forwarders(&self) -> BTreeSet<NodeId> {
        self.lock_state().init.initialized()
    }

    /// Hop VLAN ids currently held by `path_id`.
    pub fn vlans_held(&self, path_id: PathId) -> Vec<VlanId> {
        self.lock_vlans().held(path_id)
    }

    /// Installs every flow needed by `rsp`.
    ///
    /// Either all flows of the render are committed or none are.
    pub fn render(&self, rsp: &RenderedServicePath) -> Result<RenderReport, RenderError> {
        let _in_flight = InFlightGuard::new(self.model.as_ref(), rsp.path_id);
        info!(path_id = rsp.path_id, name = %rsp.name, transport = %rsp.transport, "Rendering service path");

        match self.render_in_flight(rsp) {
            Ok(report) => {
                self.lock_vlans().commit(rsp.path_id);
                {
                    let mut state = self.lock_state();
                    let stats = &mut state.stats;
                    stats.renders = stats.renders.saturating_add(1);
                    stats.flows_committed = stats.flows_committed.saturating_add(report.flows_committed as u64);
                    stats.forwarders_initialized = stats
                        .forwarders_initialized
                        .saturating_add(report.initialized_nodes.len() as u64);
                    stats.legs_skipped = stats.legs_skipped.saturating_add(report.skipped.len() as u64);
                }
                audit_log!(AuditRecord::new(AuditCategory::PathRender, SOURCE, "render_path")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(rsp.path_id.to_string())
                    .with_object_type("rendered_service_path")
                    .with_details(serde_json::json!({
                        "name": rsp.name,
                        "variant": report.variant.to_string(),
                        "flows": report.flows_committed,
                        "initialized_nodes": report.initialized_nodes,
                        "skipped_legs": report.skipped.len(),
                    })));
                Ok(report)
            }
            Err(e) => {
                self.lock_vlans().abandon(rsp.path_id);
                {
                    let mut state = self.lock_state();
                    state.stats.render_failures = state.stats.render_failures.saturating_add(1);
                }
                error!(path_id = rsp.path_id, error = %e, "Render failed");
                audit_log!(AuditRecord::new(AuditCategory::PathRender, SOURCE, "render_path")
                    .with_object_id(rsp.path_id.to_string())
                    .with_object_type("rendered_service_path")
                    .with_details(serde_json::json!({ "kind": e.kind() }))
                    .with_error(e.to_string()));
                Err(e)
            }
        }
    }

    fn render_in_flight(&self, rsp: &RenderedServicePath) -> Result<RenderReport, RenderError> {
        let mut graph = build_graph(rsp, self.model.as_ref(), self.placement.as_ref())?;

        let key = TransportKey::for_path(rsp, &graph);
        let variant = select_variant(key).ok_or(RenderError::NoTransportProcessor {
            transport: rsp.transport,
            encapsulation: rsp.encapsulation,
        })?;
        let ctx = ProcessorContext {
            model: self.model.as_ref(),
            placement: self.placement.as_ref(),
            config: &self.config,
            vlans: &self.vlans,
            path_id: rsp.path_id,
        };
        let mut processor = variant.processor(ctx);
        debug!(path_id = rsp.path_id, %variant, "Selected transport processor");

        processor.resolve_forwarder_locators(&mut graph)?;
        processor.compute_transport_values(&mut graph, rsp)?;

        let logical_mode = graph.is_logical_mode();
        let tables = match processor.table_index_override() {
            Some(tables) if logical_mode => tables,
            _ => self.config.standard_tables(),
        };
        let graph = graph;

        let mut report = RenderReport::new(rsp.path_id, variant, logical_mode);
        {
            let mut state = self.lock_state();
            let mut emitter = Emitter {
                staged: StagedFlows::new(tables),
                pending_init: BTreeSet::new(),
                report: &mut report,
            };

            for index in 0..graph.len() {
                if let Err(e) = self.emit_entry(processor.as_ref(), &graph, index, &state.init, &mut emitter) {
                    let purged = emitter.staged.purge();
                    self.audit_rollback(rsp.path_id, purged, &e);
                    return Err(e);
                }
            }

            let Emitter {
                staged,
                pending_init,
                report,
            } = emitter;
            report.flows_committed = match staged.flush(self.sink.as_ref()) {
                Ok(count) => count,
                Err(e) => {
                    let e = RenderError::from(e);
                    self.audit_rollback(rsp.path_id, 0, &e);
                    return Err(e);
                }
            };
            state.init.mark_initialized(&pending_init);
            for node in &pending_init {
                audit_log!(AuditRecord::new(AuditCategory::ForwarderInit, SOURCE, "install_defaults")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(node.to_string())
                    .with_object_type("switch"));
            }
            report.initialized_nodes = pending_init.into_iter().collect();
        }

        processor.on_render_complete(&graph, rsp, self.opstate.as_ref());
        info!(
            path_id = rsp.path_id,
            flows = report.flows_committed,
            skipped = report.skipped.len(),
            "Rendered service path"
        );
        Ok(report)
    }

    fn emit_entry(
        &self,
        processor: &dyn TransportProcessor,
        graph: &RenderGraph,
        index: usize,
        init: &ForwarderInitTable,
        emitter: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        let Some(entry) = graph.get(index) else {
            return Ok(());
        };
        let hop = EntryContext {
            index,
            entry,
            dst_node: self.node_identity(&entry.dst, entry.path_id, entry.dst_placement)?,
            src_node: self.node_identity(&entry.src, entry.path_id, entry.src_placement)?,
            locators: self.entry_locators(entry),
        };

        if let (Some(node), Some(name)) = (&hop.dst_node, entry.dst.name()) {
            if !init.is_initialized(node) && !emitter.pending_init.contains(node) {
                let accelerated = self
                    .model
                    .forwarder(name, entry.path_id)
                    .and_then(|f| f.accelerated_port);
                emitter.staged.set_owner(FlowOwner::Unowned);
                for spec in default_flows(&self.config, accelerated) {
                    emitter.staged.stage(node, spec);
                }
                emitter.pending_init.insert(node.clone());
                debug!(path_id = entry.path_id, node = %node, forwarder = name, "Staged forwarder defaults");
            }
        }
        emitter.staged.set_owner(FlowOwner::Path(entry.path_id));

        let locators = &hop.locators;
        if let Some(node) = &hop.dst_node {
            emitter.stage(node, index, "sff-transport-ingress", processor.sff_transport_ingress(entry));
            if let Some(dst_sf) = &locators.dst_sf {
                emitter.stage(node, index, "sf-transport-ingress", processor.sf_transport_ingress(entry, dst_sf));
            }
            emitter.stage(
                node,
                index,
                "sff-path-mapper",
                processor.sff_path_mapper(entry, entry.hop_ingress.as_ref()),
            );
            if let Some(dst_sf) = &locators.dst_sf {
                emitter.stage(node, index, "sf-path-mapper", processor.sf_path_mapper(entry, dst_sf));
            }
        }

        self.emit_next_hops(processor, graph, &hop, emitter);

        if entry.dst.is_egress() {
            if let Some(node) = &hop.src_node {
                emitter.stage(
                    node,
                    index,
                    "terminal-transport-egress",
                    processor.terminal_transport_egress(entry, locators.src_sf.as_ref(), entry.path_egress.as_ref()),
                );
            }
            return Ok(());
        }
        if let (Some(node), Some(dst_sf)) = (&hop.dst_node, &locators.dst_sf) {
            emitter.stage(node, index, "sf-transport-egress", processor.sf_transport_egress(entry, dst_sf));
        }
        if let Some(node) = &hop.src_node {
            if !entry.is_same_forwarder() || graph.is_cross_placement_hop(index) {
                emitter.stage(
                    node,
                    index,
                    "sff-transport-egress",
                    processor.sff_transport_egress(
                        entry,
                        locators.src_egress.as_ref(),
                        locators.dst_ingress.as_ref(),
                        entry.hop_ingress.as_ref(),
                    ),
                );
            }
        }
        Ok(())
    }

    fn emit_next_hops(
        &self,
        processor: &dyn TransportProcessor,
        graph: &RenderGraph,
        hop: &EntryContext<'_>,
        emitter: &mut Emitter<'_>,
    ) {
        let EntryContext {
            index,
            entry,
            dst_node,
            src_node,
            locators,
        } = hop;
        let index = *index;

        if let (Some(dst_sf), Some(node)) = (&locators.dst_sf, dst_node) {
            if entry.src.is_ingress() {
                emitter.stage(node, index, "next-hop-gateway-to-sf", processor.next_hop_gateway_to_sf(entry, dst_sf));
                return;
            }
            emitter.stage(
                node,
                index,
                "next-hop-sff-to-sf",
                processor.next_hop_sff_to_sf(entry, locators.src_egress.as_ref(), dst_sf),
            );
        }

        if entry.dst.is_egress() {
            if let (Some(src_sf), Some(node)) = (&locators.src_sf, src_node) {
                emitter.stage(node, index, "next-hop-sf-to-gateway", processor.next_hop_sf_to_gateway(entry, src_sf));
            }
        }

        if graph.is_intra_logical_hop(index) {
            return;
        }

        if let (Some(src_sf), Some(node)) = (&locators.src_sf, src_node) {
            if entry.is_same_forwarder() {
                if let Some(dst_sf) = &locators.dst_sf {
                    emitter.stage(node, index, "next-hop-sf-to-sf", processor.next_hop_sf_to_sf(entry, src_sf, dst_sf));
                }
            } else {
                // towards the egress gateway there is no ingress locator
                emitter.stage(
                    node,
                    index,
                    "next-hop-sf-to-sff",
                    processor.next_hop_sf_to_sff(entry, src_sf, locators.dst_ingress.as_ref()),
                );
            }
        }
    }

    fn node_identity(
        &self,
        forwarder: &ForwarderRef,
        path_id: PathId,
        placement: Option<PlacementId>,
    ) -> Result<Option<NodeId>, RenderError> {
        let Some(name) = forwarder.name() else {
            return Ok(None);
        };
        self.model
            .forwarder_node_identity(name, path_id, placement)
            .map(Some)
            .ok_or_else(|| RenderError::UnresolvedForwarderIdentity {
                forwarder: name.to_string(),
            })
    }

    fn entry_locators(&self, entry: &GraphEntry) -> EntryLocators {
        let path_id = entry.path_id;
        let direction = if entry.is_forward_path {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        let src = entry.src.name().and_then(|name| self.model.forwarder(name, path_id));
        let dst = entry.dst.name().and_then(|name| self.model.forwarder(name, path_id));

        let dst_sf = dst.as_ref().zip(entry.sf.as_deref()).and_then(|(fwd, sf)| {
            let sf = self.model.service_function(sf, path_id)?;
            self.model.ingress_sf_locator(fwd, &sf, direction)
        });
        let src_sf = src.as_ref().zip(entry.prev_sf.as_deref()).and_then(|(fwd, sf)| {
            let sf = self.model.service_function(sf, path_id)?;
            self.model.egress_sf_locator(fwd, &sf, direction)
        });
        let src_egress = src
            .as_ref()
            .zip(entry.src_egress_locator.as_deref())
            .and_then(|(fwd, name)| self.model.forwarder_locator(fwd, name));
        let dst_ingress = dst
            .as_ref()
            .zip(entry.dst_ingress_locator.as_deref())
            .and_then(|(fwd, name)| self.model.forwarder_locator(fwd, name));

        EntryLocators {
            dst_sf,
            src_sf,
            src_egress,
            dst_ingress,
        }
    }

    fn audit_rollback(&self, path_id: PathId, purged: usize, e: &RenderError) {
        warn!(path_id, purged, error = %e, "Rolled back render");
        audit_log!(AuditRecord::new(AuditCategory::Rollback, SOURCE, "purge_staged_flows")
            .with_object_id(path_id.to_string())
            .with_object_type("rendered_service_path")
            .with_details(serde_json::json!({ "purged": purged }))
            .with_error(e.to_string()));
    }

    /// Removes every flow owned by `rsp` and returns the switches that lost
    /// flows. Those switches get their defaults again on their next render.
    pub fn delete_rendered_service_path(&self, rsp: &RenderedServicePath) -> Result<BTreeSet<NodeId>, RenderError> {
        let touched = {
            let mut state = self.lock_state();
            let touched = match self.sink.delete_by_owner(rsp.path_id) {
                Ok(touched) => touched,
                Err(e) => {
                    audit_log!(AuditRecord::new(AuditCategory::PathDelete, SOURCE, "delete_path")
                        .with_object_id(rsp.path_id.to_string())
                        .with_object_type("rendered_service_path")
                        .with_error(e.to_string()));
                    return Err(e.into());
                }
            };
            let reset = state.init.reset(&touched);
            state.stats.deletes = state.stats.deletes.saturating_add(1);
            debug!(path_id = rsp.path_id, nodes = touched.len(), reset, "Reset forwarder defaults");
            touched
        };
        let released = self.lock_vlans().release(rsp.path_id);
        if released > 0 {
            debug!(path_id = rsp.path_id, released, "Released hop VLANs");
        }

        self.opstate.on_delete(rsp);
        info!(path_id = rsp.path_id, name = %rsp.name, nodes = touched.len(), "Deleted service path");
        audit_log!(AuditRecord::new(AuditCategory::PathDelete, SOURCE, "delete_path")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(rsp.path_id.to_string())
            .with_object_type("rendered_service_path")
            .with_details(serde_json::json!({ "nodes": touched })));
        Ok(touched)
    }

    fn lock_state(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_vlans(&self) -> MutexGuard<'_, VlanPool> {
        self.vlans.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
