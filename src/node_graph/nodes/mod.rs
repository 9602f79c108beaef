use serde_json::Value;

use crate::models::device::HsvColor;
use crate::models::schema::{
    NodeInstance, NodeTypeDef, ParamDef, ParamType, PortDef, PortType,
};
use crate::node_graph::state::ExecutionState;
use crate::node_graph::NodeExecutionContext;

mod color;
mod devices;
mod logic;
mod timers;

pub fn run_node(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<(), String> {
    if timers::run_node(node, ctx, state)? {
        return Ok(());
    }
    if logic::run_node(node, ctx, state)? {
        return Ok(());
    }
    if color::run_node(node, ctx, state)? {
        return Ok(());
    }
    if devices::run_node(node, ctx, state)? {
        return Ok(());
    }
    state.warn_once(
        &format!("unknown-type:{}", node.type_id),
        &format!("Encountered unknown node type '{}'", node.type_id),
    );
    Ok(())
}

pub fn get_node_types() -> Vec<NodeTypeDef> {
    let mut types = Vec::new();
    types.extend(timers::get_node_types());
    types.extend(logic::get_node_types());
    types.extend(color::get_node_types());
    types.extend(devices::get_node_types());
    types
}

// --- per-node input/param helpers ---------------------------------------

/// Current value on one input port, or None when the port is unconnected or
/// the upstream node has not produced anything yet.
pub(crate) fn input_value(
    ctx: &NodeExecutionContext<'_>,
    state: &ExecutionState,
    node_id: &str,
    port: &str,
) -> Option<Value> {
    let edge = ctx
        .incoming_edges
        .get(node_id)?
        .iter()
        .find(|e| e.to_port == port)?;
    state.value(&edge.from_node, &edge.from_port).cloned()
}

pub(crate) fn input_bool(
    ctx: &NodeExecutionContext<'_>,
    state: &ExecutionState,
    node_id: &str,
    port: &str,
) -> Option<bool> {
    input_value(ctx, state, node_id, port)?.as_bool()
}

pub(crate) fn input_number(
    ctx: &NodeExecutionContext<'_>,
    state: &ExecutionState,
    node_id: &str,
    port: &str,
) -> Option<f64> {
    input_value(ctx, state, node_id, port)?.as_f64()
}

pub(crate) fn input_color(
    ctx: &NodeExecutionContext<'_>,
    state: &ExecutionState,
    node_id: &str,
    port: &str,
) -> Option<HsvColor> {
    serde_json::from_value(input_value(ctx, state, node_id, port)?).ok()
}

pub(crate) fn param_f64(node: &NodeInstance, key: &str, default: f64) -> f64 {
    node.params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub(crate) fn param_str<'a>(node: &'a NodeInstance, key: &str) -> Option<&'a str> {
    node.params.get(key).and_then(|v| v.as_str())
}

pub(crate) fn param_bool(node: &NodeInstance, key: &str, default: bool) -> bool {
    match node.params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        _ => default,
    }
}

// --- node type definition helpers ----------------------------------------

pub(crate) fn port(id: &str, name: &str, port_type: PortType) -> PortDef {
    PortDef {
        id: id.into(),
        name: name.into(),
        port_type,
    }
}

pub(crate) fn num_param(id: &str, name: &str, default: f64) -> ParamDef {
    ParamDef {
        id: id.into(),
        name: name.into(),
        param_type: ParamType::Number,
        default_number: Some(default),
        default_text: None,
    }
}

pub(crate) fn text_param(id: &str, name: &str, default: &str) -> ParamDef {
    ParamDef {
        id: id.into(),
        name: name.into(),
        param_type: ParamType::Text,
        default_number: None,
        default_text: Some(default.into()),
    }
}

pub(crate) fn toggle_param(id: &str, name: &str, default_on: bool) -> ParamDef {
    ParamDef {
        id: id.into(),
        name: name.into(),
        param_type: ParamType::Toggle,
        default_number: Some(if default_on { 1.0 } else { 0.0 }),
        default_text: None,
    }
}

pub(crate) fn node_type(
    id: &str,
    name: &str,
    category: &str,
    inputs: Vec<PortDef>,
    outputs: Vec<PortDef>,
    params: Vec<ParamDef>,
) -> NodeTypeDef {
    NodeTypeDef {
        id: id.into(),
        name: name.into(),
        description: None,
        category: Some(category.into()),
        inputs,
        outputs,
        params,
    }
}
