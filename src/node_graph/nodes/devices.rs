use serde_json::{json, Value};

use super::*;
use crate::models::device::{DeviceDescriptor, Vendor};

pub fn run_node(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<bool, String> {
    match node.type_id.as_str() {
        "hue_light" => run_light_sink(Vendor::Hue, node, ctx, state).map(|_| true),
        "govee_light" => run_light_sink(Vendor::Govee, node, ctx, state).map(|_| true),
        "kasa_light" => run_light_sink(Vendor::Kasa, node, ctx, state).map(|_| true),
        "kasa_plug" => {
            let Some(on) = input_bool(ctx, state, &node.id, "in") else {
                return Ok(true);
            };
            let Some((device_id, model)) = resolve_device(Vendor::Kasa, node, ctx, state) else {
                return Ok(true);
            };
            let descriptor =
                DeviceDescriptor::new(Vendor::Kasa, device_id, model, on, None).as_plug();
            dispatch_if_changed(node, ctx, state, descriptor)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Desired power and color extracted from whatever a sink's input carries:
/// a bare boolean, a merged light object `{on, color}`, or a raw color
/// (which implies power-on).
fn parse_light_state(value: &Value) -> Result<(bool, Option<HsvColor>), String> {
    if let Some(on) = value.as_bool() {
        return Ok((on, None));
    }
    if let Some(obj) = value.as_object() {
        if let Some(on) = obj.get("on").and_then(|v| v.as_bool()) {
            let color = match obj.get("color") {
                Some(Value::Null) | None => None,
                Some(c) => Some(
                    serde_json::from_value(c.clone())
                        .map_err(|e| format!("Invalid color in light state: {}", e))?,
                ),
            };
            return Ok((on, color));
        }
        if let Ok(color) = serde_json::from_value::<HsvColor>(value.clone()) {
            return Ok((true, Some(color)));
        }
    }
    Err(format!("Unsupported light state payload: {}", value))
}

fn run_light_sink(
    vendor: Vendor,
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<(), String> {
    // Nothing upstream has produced a value yet: leave the device alone.
    let Some(input) = input_value(ctx, state, &node.id, "in") else {
        return Ok(());
    };
    // Slot values persist across ticks, so a bad payload would otherwise be
    // re-reported every tick until it is overwritten. Log once and skip.
    let (on, color) = match parse_light_state(&input) {
        Ok(parsed) => parsed,
        Err(e) => {
            state
                .node_status
                .insert(node.id.clone(), "incomplete flow".into());
            state.warn_once(
                &format!("bad-input:{}", node.id),
                &format!("{} node '{}': {}", vendor, node.id, e),
            );
            return Ok(());
        }
    };

    let Some((device_id, model)) = resolve_device(vendor, node, ctx, state) else {
        return Ok(());
    };
    let descriptor = DeviceDescriptor::new(vendor, device_id, model, on, color);
    dispatch_if_changed(node, ctx, state, descriptor)
}

/// Map the node's `device` param to a registry entry. An unknown selector is
/// still usable as a raw device id so graphs work before discovery has run.
/// A missing param is a configuration error: status is set and the node is
/// skipped without failing the tick.
fn resolve_device(
    vendor: Vendor,
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Option<(String, Option<String>)> {
    let selector = match param_str(node, "device").filter(|s| !s.trim().is_empty()) {
        Some(s) => s,
        None => {
            state
                .node_status
                .insert(node.id.clone(), "no device selected".into());
            state.warn_once(
                &format!("no-device:{}", node.id),
                &format!("{} node '{}' has no device selected", vendor, node.id),
            );
            return None;
        }
    };
    match ctx.registry.resolve(vendor, selector) {
        Some(info) => Some((info.id, info.model)),
        None => Some((
            selector.to_string(),
            param_str(node, "model")
                .filter(|s| !s.trim().is_empty())
                .map(String::from),
        )),
    }
}

fn dispatch_if_changed(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
    descriptor: DeviceDescriptor,
) -> Result<(), String> {
    // Baselines are per sink node, not per device, so two nodes driving the
    // same light each track what they last asked for.
    let key = format!("{}/{}", node.id, descriptor.device_key());
    let payload = serde_json::to_value(&descriptor).map_err(|e| e.to_string())?;

    if state.change.changed(&key, &payload) {
        if ctx.dispatcher.enqueue(descriptor) {
            state.change.record(&key, payload);
            state.node_status.insert(node.id.clone(), "sent".into());
        } else {
            // Not recorded: the same state will be retried next tick once
            // the vendor queue exists.
            state
                .node_status
                .insert(node.id.clone(), "dispatcher unavailable".into());
        }
    } else {
        state.node_status.insert(node.id.clone(), "suppressed".into());
    }

    state.set_value(&node.id, "api_calls", json!(ctx.dispatcher.calls_sent()));
    Ok(())
}

pub fn get_node_types() -> Vec<NodeTypeDef> {
    let light_inputs = || vec![port("in", "Light", PortType::Device)];
    let light_outputs = || vec![port("api_calls", "API Calls", PortType::Number)];
    let light_params = || {
        vec![
            text_param("device", "Device (id or name)", ""),
            text_param("model", "Model", ""),
        ]
    };
    vec![
        node_type(
            "hue_light",
            "Hue Light",
            "devices",
            light_inputs(),
            light_outputs(),
            light_params(),
        ),
        node_type(
            "govee_light",
            "Govee Light",
            "devices",
            light_inputs(),
            light_outputs(),
            light_params(),
        ),
        node_type(
            "kasa_light",
            "Kasa Light",
            "devices",
            light_inputs(),
            light_outputs(),
            light_params(),
        ),
        node_type(
            "kasa_plug",
            "Kasa Plug",
            "devices",
            vec![port("in", "Power", PortType::Boolean)],
            light_outputs(),
            vec![text_param("device", "Device (id or name)", "")],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_state_accepts_bool_object_and_raw_color() {
        assert_eq!(parse_light_state(&json!(false)).unwrap(), (false, None));

        let (on, color) = parse_light_state(&json!({
            "on": true,
            "color": { "hue": 0.5, "saturation": 1.0, "brightness": 200.0 }
        }))
        .unwrap();
        assert!(on);
        assert_eq!(color, Some(HsvColor::new(0.5, 1.0, 200.0)));

        // A raw color implies power-on.
        let (on, color) =
            parse_light_state(&json!({ "hue": 0.1, "saturation": 0.2, "brightness": 30.0 }))
                .unwrap();
        assert!(on);
        assert!(color.is_some());
    }

    #[test]
    fn light_state_rejects_unrelated_payloads() {
        assert!(parse_light_state(&json!(42)).is_err());
        assert!(parse_light_state(&json!({ "volume": 10 })).is_err());
    }
}
