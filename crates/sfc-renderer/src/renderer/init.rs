use crate::flow::NodeId;
use std::collections::{BTreeSet, HashSet};

/// Switches whose one-time default flows are installed.
#[derive(Debug, Default, Clone)]
pub struct ForwarderInitTable {
    initialized: HashSet<NodeId>,
}

impl ForwarderInitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, node: &NodeId) -> bool {
        self.initialized.contains(node)
    }

    pub fn mark_initialized<'a>(&mut self, nodes: impl IntoIterator<Item = &'a NodeId>) {
        self.initialized.extend(nodes.into_iter().cloned());
    }

    /// Forgets `nodes`; returns how many were initialized.
    pub fn reset<'a>(&mut self, nodes: impl IntoIterator<Item = &'a NodeId>) -> usize {
        nodes
            .into_iter()
            .filter(|node| self.initialized.remove(*node))
            .count()
    }

    pub fn initialized(&self) -> BTreeSet<NodeId> {
        self.initialized.iter().cloned().collect()
    }
}
