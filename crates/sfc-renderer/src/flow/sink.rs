use super::types::{FlowAction, FlowEntry, FlowKey, FlowOwner, FlowSpec, FlowTable, NodeId, TableIndex};
use crate::model::PathId;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowSinkError {
    #[error("switch {node} rejected the flow batch: {reason}")]
    Rejected { node: NodeId, reason: String },
    #[error("flow store unavailable: {0}")]
    Unavailable(String),
}

/// Destination of committed flows.
///
/// `commit` must apply a batch atomically: either every flow becomes
/// visible or none does.
pub trait FlowSink: Send + Sync {
    fn commit(&self, flows: Vec<FlowEntry>) -> Result<(), FlowSinkError>;

    /// Removes every flow owned by `path_id` and reports the switches that
    /// lost flows.
    fn delete_by_owner(&self, path_id: PathId) -> Result<BTreeSet<NodeId>, FlowSinkError>;
}

/// Flows buffered for one render until they are flushed or purged.
#[derive(Debug)]
pub struct StagedFlows {
    tables: TableIndex,
    owner: FlowOwner,
    flows: Vec<FlowEntry>,
}

impl StagedFlows {
    pub fn new(tables: TableIndex) -> Self {
        Self {
            tables,
            owner: FlowOwner::Unowned,
            flows: Vec::new(),
        }
    }

    /// Owner stamped on flows staged from now on.
    pub fn set_owner(&mut self, owner: FlowOwner) {
        self.owner = owner;
    }

    pub fn tables(&self) -> &TableIndex {
        &self.tables
    }

    pub fn stage(&mut self, node: &NodeId, spec: FlowSpec) {
        let table_id = self.tables.resolve(spec.table);
        let actions = spec
            .actions
            .into_iter()
            .map(|action| match action {
                FlowAction::GotoTable(t) => FlowAction::GotoTable(FlowTable::Raw(self.tables.resolve(t))),
                FlowAction::Resubmit(t) => FlowAction::Resubmit(FlowTable::Raw(self.tables.resolve(t))),
                other => other,
            })
            .collect();
        self.flows.push(FlowEntry {
            node: node.clone(),
            table_id,
            table: spec.table,
            priority: spec.priority,
            flow_match: spec.flow_match,
            actions,
            owner: self.owner,
            kind: spec.kind,
        });
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn flows(&self) -> &[FlowEntry] {
        &self.flows
    }

    /// Commits everything staged as one batch.
    pub fn flush(self, sink: &dyn FlowSink) -> Result<usize, FlowSinkError> {
        let count = self.flows.len();
        if count > 0 {
            sink.commit(self.flows)?;
        }
        debug!(flows = count, "Flushed staged flows");
        Ok(count)
    }

    /// Discards everything staged.
    pub fn purge(self) -> usize {
        self.flows.len()
    }
}

/// Versions of one flow key, one per owner. The most recently committed
/// version is the one installed on the switch.
#[derive(Debug)]
struct FlowSlot {
    key: FlowKey,
    versions: Vec<FlowEntry>,
}

impl FlowSlot {
    fn installed(&self) -> Option<&FlowEntry> {
        self.versions.last()
    }

    fn install(&mut self, flow: FlowEntry) {
        self.versions.retain(|v| v.owner != flow.owner);
        self.versions.push(flow);
    }
}

/// Flow sink holding flows in memory, keyed by switch, table, priority
/// and match.
///
/// Paths that need a flow with the same key share it. Deleting one path
/// reinstates the version of a remaining owner, and the flow leaves the
/// switch only when its last owner is deleted.
#[derive(Debug, Default)]
pub struct InMemoryFlowSink {
    slots: Mutex<Vec<FlowSlot>>,
    commits: AtomicUsize,
}

impl InMemoryFlowSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed flows, in the order their keys were first committed.
    pub fn flows(&self) -> Vec<FlowEntry> {
        self.lock().iter().filter_map(FlowSlot::installed).cloned().collect()
    }

    pub fn flows_on(&self, node: &NodeId) -> Vec<FlowEntry> {
        self.lock()
            .iter()
            .filter(|slot| &slot.key.node == node)
            .filter_map(FlowSlot::installed)
            .cloned()
            .collect()
    }

    /// Owners holding the flow installed under `key`.
    pub fn owners_of(&self, key: &FlowKey) -> Vec<FlowOwner> {
        self.lock()
            .iter()
            .find(|slot| &slot.key == key)
            .map(|slot| slot.versions.iter().map(|v| v.owner).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of batches accepted so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FlowSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FlowSink for InMemoryFlowSink {
    fn commit(&self, flows: Vec<FlowEntry>) -> Result<(), FlowSinkError> {
        let mut slots = self.lock();
        for flow in flows {
            let key = flow.key();
            match slots.iter_mut().find(|slot| slot.key == key) {
                Some(slot) => slot.install(flow),
                None => slots.push(FlowSlot {
                    key,
                    versions: vec![flow],
                }),
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_by_owner(&self, path_id: PathId) -> Result<BTreeSet<NodeId>, FlowSinkError> {
        let owner = FlowOwner::Path(path_id);
        let mut slots = self.lock();
        let mut touched = BTreeSet::new();
        let mut kept = 0usize;
        slots.retain_mut(|slot| {
            let before = slot.versions.len();
            slot.versions.retain(|v| v.owner != owner);
            if slot.versions.len() == before {
                return true;
            }
            if slot.versions.is_empty() {
                touched.insert(slot.key.node.clone());
                return false;
            }
            kept += 1;
            true
        });
        if kept > 0 {
            debug!(path_id, kept, "Shared flows stay installed for remaining paths");
        }
        Ok(touched)
    }
}
