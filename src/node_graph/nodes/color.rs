use serde_json::json;

use super::*;

pub fn run_node(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<bool, String> {
    match node.type_id.as_str() {
        "hsv_control" => {
            // Ports override params so a knob can be driven by the graph.
            let hue = input_number(ctx, state, &node.id, "hue")
                .unwrap_or_else(|| param_f64(node, "hue", 0.0));
            let saturation = input_number(ctx, state, &node.id, "saturation")
                .unwrap_or_else(|| param_f64(node, "saturation", 1.0));
            let brightness = input_number(ctx, state, &node.id, "brightness")
                .unwrap_or_else(|| param_f64(node, "brightness", 255.0));

            let color = HsvColor::new(hue, saturation, brightness);
            let candidate = serde_json::to_value(color)
                .map_err(|e| format!("HSV Control node '{}': {}", node.id, e))?;

            // Settle rapidly-moving inputs before they reach a device sink.
            let debounce_ms = param_f64(node, "debounce_ms", 0.0).max(0.0) as u64;
            let value = state.debounce.poll(&node.id, candidate, debounce_ms, ctx.now);
            state.set_value(&node.id, "color", value);
            Ok(true)
        }
        "gain" => {
            let Some(color) = input_color(ctx, state, &node.id, "in") else {
                return Ok(true);
            };
            let gain = param_f64(node, "gain", 1.0);
            let mut level = (color.brightness / 255.0) * gain;

            if let Some(curve_raw) = param_str(node, "curve").filter(|s| !s.trim().is_empty()) {
                let curve: Vec<f64> = serde_json::from_str(curve_raw).map_err(|e| {
                    format!("Gain node '{}' has an invalid curve: {}", node.id, e)
                })?;
                if curve.len() < 2 {
                    return Err(format!(
                        "Gain node '{}' curve needs at least 2 points",
                        node.id
                    ));
                }
                level = lookup_curve(&curve, level);
            }

            let out = HsvColor::new(color.hue, color.saturation, level * 255.0);
            state.set_value(
                &node.id,
                "out",
                serde_json::to_value(out).map_err(|e| e.to_string())?,
            );
            Ok(true)
        }
        "hsv_to_rgb" => {
            let Some(color) = input_color(ctx, state, &node.id, "in") else {
                return Ok(true);
            };
            let rgb = color.to_rgb();
            state.set_value(
                &node.id,
                "out",
                json!({ "r": rgb.r, "g": rgb.g, "b": rgb.b }),
            );
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Piecewise-linear lookup over evenly spaced curve points, input and
/// output both 0..=1.
fn lookup_curve(curve: &[f64], level: f64) -> f64 {
    let t = level.clamp(0.0, 1.0) * (curve.len() - 1) as f64;
    let idx = (t.floor() as usize).min(curve.len() - 2);
    let frac = t - idx as f64;
    let a = curve[idx].clamp(0.0, 1.0);
    let b = curve[idx + 1].clamp(0.0, 1.0);
    a + (b - a) * frac
}

pub fn get_node_types() -> Vec<NodeTypeDef> {
    vec![
        node_type(
            "hsv_control",
            "HSV Control",
            "color",
            vec![
                port("hue", "Hue", PortType::Number),
                port("saturation", "Saturation", PortType::Number),
                port("brightness", "Brightness", PortType::Number),
            ],
            vec![port("color", "Color", PortType::Color)],
            vec![
                num_param("hue", "Hue (0-1)", 0.0),
                num_param("saturation", "Saturation (0-1)", 1.0),
                num_param("brightness", "Brightness (0-255)", 255.0),
                num_param("debounce_ms", "Debounce (ms)", 0.0),
            ],
        ),
        node_type(
            "gain",
            "Gain",
            "color",
            vec![port("in", "Color", PortType::Color)],
            vec![port("out", "Color", PortType::Color)],
            vec![
                num_param("gain", "Gain", 1.0),
                text_param("curve", "Curve (JSON array)", ""),
            ],
        ),
        node_type(
            "hsv_to_rgb",
            "HSV to RGB",
            "color",
            vec![port("in", "Color", PortType::Color)],
            vec![port("out", "RGB", PortType::Event)],
            vec![],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_lookup_interpolates_between_points() {
        let curve = [0.0, 0.5, 1.0];
        assert!((lookup_curve(&curve, 0.0)).abs() < 1e-9);
        assert!((lookup_curve(&curve, 0.25) - 0.25).abs() < 1e-9);
        assert!((lookup_curve(&curve, 0.5) - 0.5).abs() < 1e-9);
        assert!((lookup_curve(&curve, 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn curve_lookup_clamps_out_of_range_input() {
        let curve = [0.1, 0.9];
        assert!((lookup_curve(&curve, -2.0) - 0.1).abs() < 1e-9);
        assert!((lookup_curve(&curve, 5.0) - 0.9).abs() < 1e-9);
    }
}
