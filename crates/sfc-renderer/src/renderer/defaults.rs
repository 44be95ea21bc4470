use crate::config::RendererConfig;
use crate::flow::{priority, FlowAction, FlowKind, FlowMatch, FlowSpec, FlowTable, Port};

/// Flows every switch needs once before any path is rendered on it.
///
/// Unmatched traffic falls through the pipeline to transport egress, where
/// it is dropped or handed to the application egress table.
pub(super) fn default_flows(config: &RendererConfig, accelerated_port: Option<u32>) -> Vec<FlowSpec> {
    let match_any = |table, action| {
        FlowSpec::new(FlowKind::MatchAny, table, priority::MATCH_ANY).with_actions(vec![action])
    };
    let egress_miss = match config.app_egress_table {
        Some(table) => FlowAction::GotoTable(FlowTable::Raw(table)),
        None => FlowAction::Drop,
    };

    let mut flows = vec![
        match_any(FlowTable::TransportIngress, FlowAction::Drop),
        match_any(FlowTable::PathMapper, FlowAction::GotoTable(FlowTable::PathMapperAcl)),
        match_any(FlowTable::PathMapperAcl, FlowAction::GotoTable(FlowTable::NextHop)),
        match_any(FlowTable::NextHop, FlowAction::GotoTable(FlowTable::TransportEgress)),
        match_any(FlowTable::TransportEgress, egress_miss),
    ];

    if let Some(port) = accelerated_port {
        let bypass = |flow_match, action| {
            FlowSpec::new(FlowKind::AcceleratedBypass, FlowTable::Classifier, priority::ACCELERATED_BYPASS)
                .with_match(flow_match)
                .with_actions(vec![action])
        };
        flows.push(bypass(
            FlowMatch::new().in_port(Port::Number(port)),
            FlowAction::GotoTable(FlowTable::TransportIngress),
        ));
        flows.push(bypass(
            FlowMatch::new().in_port(Port::Local),
            FlowAction::Output(Port::Number(port)),
        ));
    }
    flows
}
