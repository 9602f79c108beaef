use serde_json::json;

use super::*;

pub fn run_node(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<bool, String> {
    match node.type_id.as_str() {
        "pass_through" => {
            if let Some(value) = input_value(ctx, state, &node.id, "in") {
                state.set_value(&node.id, "out", value);
            }
            Ok(true)
        }
        "toggle" => {
            let input = input_bool(ctx, state, &node.id, "in").unwrap_or(false);
            let last_in_key = format!("{}#in", node.id);
            let last_in = state.timer_states.get(&last_in_key).copied().unwrap_or(false);

            let mut value = match state.timer_states.get(&node.id) {
                Some(v) => *v,
                None => {
                    let initial = param_bool(node, "initial", false);
                    state.set_value(&node.id, "out", json!(initial));
                    initial
                }
            };
            // Flip on the rising edge only; a held-high input is one press.
            if input && !last_in {
                value = !value;
                state.set_value(&node.id, "out", json!(value));
            }
            state.timer_states.insert(last_in_key, input);
            state.timer_states.insert(node.id.clone(), value);
            Ok(true)
        }
        "trigger_bus" => {
            let inputs = ["in1", "in2", "in3", "in4", "in5"];
            let mut any_connected = false;
            let mut active = false;
            for input in inputs {
                if let Some(v) = input_bool(ctx, state, &node.id, input) {
                    any_connected = true;
                    active = active || v;
                }
            }
            // No line has produced a value yet: stay quiet.
            if any_connected {
                state.set_value(&node.id, "out", json!(active));
            }
            Ok(true)
        }
        "light_merge" => {
            let power = input_bool(ctx, state, &node.id, "power");
            let color = input_color(ctx, state, &node.id, "color");
            let on = match (power, &color) {
                (Some(p), _) => p,
                // Color alone means "show this color", which needs power.
                (None, Some(_)) => true,
                (None, None) => return Ok(true),
            };
            state.set_value(
                &node.id,
                "out",
                json!({ "on": on, "color": color }),
            );
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn get_node_types() -> Vec<NodeTypeDef> {
    vec![
        node_type(
            "pass_through",
            "Pass Through",
            "logic",
            vec![port("in", "In", PortType::Event)],
            vec![port("out", "Out", PortType::Event)],
            vec![],
        ),
        node_type(
            "toggle",
            "Toggle",
            "logic",
            vec![port("in", "Trigger", PortType::Boolean)],
            vec![port("out", "State", PortType::Boolean)],
            vec![toggle_param("initial", "Initially On", false)],
        ),
        node_type(
            "trigger_bus",
            "Trigger Bus",
            "logic",
            vec![
                port("in1", "In 1", PortType::Boolean),
                port("in2", "In 2", PortType::Boolean),
                port("in3", "In 3", PortType::Boolean),
                port("in4", "In 4", PortType::Boolean),
                port("in5", "In 5", PortType::Boolean),
            ],
            vec![port("out", "Any", PortType::Boolean)],
            vec![],
        ),
        node_type(
            "light_merge",
            "Light Merge",
            "logic",
            vec![
                port("power", "Power", PortType::Boolean),
                port("color", "Color", PortType::Color),
            ],
            vec![port("out", "Light", PortType::Device)],
            vec![],
        ),
    ]
}
