//! Test fixtures for transport processors
//!
//! Builds graph entries, attachments and a processor context without going
//! through the graph builder.

use super::{ProcessorContext, VlanPool};
use crate::config::RendererConfig;
use crate::flow::NodeId;
use crate::graph::{ForwarderRef, GraphEntry, RenderGraph};
use crate::model::{
    DataPlaneLocator, ForwarderLocator, InMemoryModel, ResolvedLocator, ServiceFunction,
    ServiceFunctionForwarder, ServiceIndex, SfAttachment,
};
use crate::placement::{NoPlacement, PlacementResolver};
use sfc_types::{MacAddress, MplsLabel, VlanId};
use std::net::IpAddr;
use std::sync::Mutex;

/// Collaborators a [`ProcessorContext`] borrows.
pub struct Fixture {
    pub model: InMemoryModel,
    pub placement: Box<dyn PlacementResolver>,
    pub config: RendererConfig,
    pub vlans: Mutex<VlanPool>,
}

impl Fixture {
    pub fn new(model: InMemoryModel) -> Self {
        let config = RendererConfig::default();
        Self {
            model,
            placement: Box::new(NoPlacement),
            vlans: Mutex::new(VlanPool::new(config.vlan_range)),
            config,
        }
    }

    pub fn empty() -> Self {
        Self::new(InMemoryModel::new())
    }

    pub fn with_placement(mut self, placement: impl PlacementResolver + 'static) -> Self {
        self.placement = Box::new(placement);
        self
    }

    pub fn ctx(&self, path_id: u32) -> ProcessorContext<'_> {
        ProcessorContext {
            model: &self.model,
            placement: self.placement.as_ref(),
            config: &self.config,
            vlans: &self.vlans,
            path_id,
        }
    }
}

pub fn model(forwarders: Vec<ServiceFunctionForwarder>, sfs: Vec<ServiceFunction>) -> InMemoryModel {
    let model = forwarders.into_iter().fold(InMemoryModel::new(), InMemoryModel::with_forwarder);
    sfs.into_iter().fold(model, InMemoryModel::with_service_function)
}

pub fn mac(s: &str) -> MacAddress {
    s.parse().unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn vlan(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

pub fn label(id: u32) -> MplsLabel {
    MplsLabel::new(id).unwrap()
}

pub fn forwarder(name: &str, node: &str) -> ServiceFunctionForwarder {
    ServiceFunctionForwarder {
        name: name.to_string(),
        node_id: Some(NodeId::new(node)),
        locators: vec![],
        service_functions: vec![],
        ingress_locator: None,
        egress_locator: None,
        accelerated_port: None,
    }
}

pub fn ip_locator(name: &str, addr: &str, port: Option<u32>) -> ForwarderLocator {
    ForwarderLocator {
        name: name.to_string(),
        locator: DataPlaneLocator::Ip {
            ip: ip(addr),
            port: None,
        },
        port,
        mac: None,
        peer: None,
    }
}

pub fn mac_locator(name: &str, addr: &str, port: Option<u32>, peer: Option<&str>) -> ForwarderLocator {
    ForwarderLocator {
        name: name.to_string(),
        locator: DataPlaneLocator::Mac {
            mac: mac(addr),
            vlan: None,
        },
        port,
        mac: None,
        peer: peer.map(str::to_string),
    }
}

pub fn sff(name: &str) -> ForwarderRef {
    ForwarderRef::Forwarder(name.to_string())
}

pub fn entry(src: ForwarderRef, dst: ForwarderRef, sf: Option<&str>, service_index: ServiceIndex) -> GraphEntry {
    GraphEntry {
        src,
        dst,
        sf: sf.map(str::to_string),
        sf_group: None,
        prev_sf: None,
        path_id: 1,
        is_forward_path: true,
        service_index,
        src_placement: None,
        dst_placement: None,
        src_egress_locator: None,
        dst_ingress_locator: None,
        hop_ingress: None,
        path_egress: None,
    }
}

pub fn graph(entries: Vec<GraphEntry>) -> RenderGraph {
    RenderGraph::new(1, entries)
}

fn attachment(sf: &str, locator: DataPlaneLocator, port: Option<u32>) -> SfAttachment {
    SfAttachment {
        service_function: sf.to_string(),
        locator_name: format!("{sf}-port"),
        locator,
        forwarder_port: port,
        forwarder_mac: None,
        l2_transparent: false,
    }
}

pub fn ip_sf(sf: &str, addr: &str, port: Option<u32>) -> SfAttachment {
    attachment(sf, DataPlaneLocator::Ip { ip: ip(addr), port: None }, port)
}

pub fn mac_sf(sf: &str, addr: &str, vlan_id: Option<u16>, port: Option<u32>) -> SfAttachment {
    attachment(
        sf,
        DataPlaneLocator::Mac {
            mac: mac(addr),
            vlan: vlan_id.map(vlan),
        },
        port,
    )
}

pub fn logical_sf(sf: &str, interface: &str, addr: Option<&str>) -> SfAttachment {
    attachment(
        sf,
        DataPlaneLocator::LogicalInterface {
            interface: interface.to_string(),
            mac: addr.map(mac),
        },
        None,
    )
}

pub fn resolved(locator: DataPlaneLocator, port: Option<u32>) -> ResolvedLocator {
    ResolvedLocator {
        port,
        ..ResolvedLocator::new(locator)
    }
}

pub fn resolved_mac(addr: &str, port: Option<u32>) -> ResolvedLocator {
    resolved(
        DataPlaneLocator::Mac {
            mac: mac(addr),
            vlan: None,
        },
        port,
    )
}

pub fn resolved_ip(addr: &str, port: Option<u32>) -> ResolvedLocator {
    resolved(DataPlaneLocator::Ip { ip: ip(addr), port: None }, port)
}

pub fn resolved_mpls(id: u32, port: Option<u32>) -> ResolvedLocator {
    resolved(DataPlaneLocator::Mpls { label: label(id) }, port)
}
