//! Model reader backed by in-process maps.

use super::reader::ModelReader;
use super::types::{PathId, ServiceFunction, ServiceFunctionForwarder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

/// Serializable content of an [`InMemoryModel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    #[serde(default)]
    pub forwarders: Vec<ServiceFunctionForwarder>,
    #[serde(default)]
    pub service_functions: Vec<ServiceFunction>,
}

/// Model reader over a fixed set of forwarders and service functions.
#[derive(Debug, Default)]
pub struct InMemoryModel {
    forwarders: HashMap<String, ServiceFunctionForwarder>,
    service_functions: HashMap<String, ServiceFunction>,
    in_flight: Mutex<BTreeSet<PathId>>,
}

impl InMemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forwarder(mut self, forwarder: ServiceFunctionForwarder) -> Self {
        self.forwarders.insert(forwarder.name.clone(), forwarder);
        self
    }

    pub fn with_service_function(mut self, sf: ServiceFunction) -> Self {
        self.service_functions.insert(sf.name.clone(), sf);
        self
    }

    /// Paths currently marked in flight.
    pub fn in_flight(&self) -> BTreeSet<PathId> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl From<ModelSnapshot> for InMemoryModel {
    fn from(snapshot: ModelSnapshot) -> Self {
        let model = snapshot
            .forwarders
            .into_iter()
            .fold(Self::new(), Self::with_forwarder);
        snapshot
            .service_functions
            .into_iter()
            .fold(model, Self::with_service_function)
    }
}

impl ModelReader for InMemoryModel {
    fn service_function(&self, name: &str, _path_id: PathId) -> Option<ServiceFunction> {
        self.service_functions.get(name).cloned()
    }

    fn forwarder(&self, name: &str, _path_id: PathId) -> Option<ServiceFunctionForwarder> {
        self.forwarders.get(name).cloned()
    }

    fn mark_in_flight(&self, path_id: PathId) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path_id);
    }

    fn clear_in_flight(&self, path_id: PathId) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path_id);
    }
}
