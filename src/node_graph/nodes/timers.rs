use chrono::{DateTime, Datelike, Local, Offset, Timelike};
use serde_json::json;

use super::*;
use crate::node_graph::state::SunTimes;

pub fn run_node(
    node: &NodeInstance,
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
) -> Result<bool, String> {
    match node.type_id.as_str() {
        "time_of_day" => {
            let start = parse_hhmm(param_str(node, "start").unwrap_or("08:00"))
                .map_err(|e| format!("Time of Day node '{}': {}", node.id, e))?;
            let stop = parse_hhmm(param_str(node, "stop").unwrap_or("22:00"))
                .map_err(|e| format!("Time of Day node '{}': {}", node.id, e))?;
            let now_min = minutes_since_midnight(&ctx.now);
            emit_on_change(state, node, "active", is_within_window(now_min, start, stop));
            Ok(true)
        }
        "sunrise_sunset" => {
            let sun = solar_times(ctx, state, &ctx.now)
                .ok_or_else(|| format!(
                    "Sunrise/Sunset node '{}': no sunrise/sunset at latitude {}",
                    node.id, ctx.settings.latitude
                ))?;
            // Each edge has its own signed offset: "on 30 min before sunset,
            // off an hour after sunrise" is two different numbers.
            let on_offset = param_f64(node, "on_offset_min", 0.0);
            let off_offset = param_f64(node, "off_offset_min", 0.0);
            let night = param_str(node, "mode").unwrap_or("night") != "day";
            // Night mode is the common lighting case: on at sunset, off at
            // sunrise, an overnight window.
            let (start, stop) = if night {
                (sun.sunset_min + on_offset, sun.sunrise_min + off_offset)
            } else {
                (sun.sunrise_min + on_offset, sun.sunset_min + off_offset)
            };
            let now_min = minutes_since_midnight(&ctx.now);
            emit_on_change(
                state,
                node,
                "active",
                is_within_window(now_min, start.rem_euclid(1440.0), stop.rem_euclid(1440.0)),
            );
            Ok(true)
        }
        "days_of_week" => {
            let keys = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
            let today = keys[ctx.now.weekday().num_days_from_monday() as usize];
            emit_on_change(state, node, "active", param_bool(node, today, true));
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Source nodes are edge-triggered: the output slot is written on the first
/// evaluation and then only when the boolean flips, so downstream device
/// nodes see a quiet line between transitions.
fn emit_on_change(state: &mut ExecutionState, node: &NodeInstance, port: &str, active: bool) {
    if state.timer_states.get(&node.id) != Some(&active) {
        state.timer_states.insert(node.id.clone(), active);
        state.set_value(&node.id, port, json!(active));
    }
}

fn minutes_since_midnight(now: &DateTime<Local>) -> f64 {
    now.hour() as f64 * 60.0 + now.minute() as f64 + now.second() as f64 / 60.0
}

/// Half-open daily window in minutes since midnight. A start after the stop
/// means the window crosses midnight ("22:00".."06:00").
fn is_within_window(now_min: f64, start_min: f64, stop_min: f64) -> bool {
    if start_min <= stop_min {
        now_min >= start_min && now_min < stop_min
    } else {
        now_min >= start_min || now_min < stop_min
    }
}

fn parse_hhmm(raw: &str) -> Result<f64, String> {
    let (h, m) = raw
        .split_once(':')
        .ok_or_else(|| format!("Invalid time '{}', expected HH:MM", raw))?;
    let hours: u32 = h
        .trim()
        .parse()
        .map_err(|_| format!("Invalid hour in '{}'", raw))?;
    let minutes: u32 = m
        .trim()
        .parse()
        .map_err(|_| format!("Invalid minute in '{}'", raw))?;
    if hours > 23 || minutes > 59 {
        return Err(format!("Time '{}' out of range", raw));
    }
    Ok(hours as f64 * 60.0 + minutes as f64)
}

/// Sunrise and sunset for the configured location, cached per local date.
/// NOAA solar equations; returns None above the polar circles when the sun
/// never rises or never sets.
fn solar_times(
    ctx: &NodeExecutionContext<'_>,
    state: &mut ExecutionState,
    now: &DateTime<Local>,
) -> Option<SunTimes> {
    let date_key = now.format("%Y-%m-%d").to_string();
    if let Some(cached) = state.sun_cache.get(&date_key) {
        return Some(*cached);
    }

    let lat = ctx.settings.latitude.to_radians();
    let doy = now.ordinal() as f64;
    let gamma = 2.0 * std::f64::consts::PI / 365.0 * (doy - 1.0);

    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    // 90.833 deg zenith accounts for refraction and the solar disc.
    let cos_ha = (90.833f64.to_radians().cos() - lat.sin() * decl.sin()) / (lat.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let ha_deg = cos_ha.acos().to_degrees();

    let utc_offset_min = now.offset().fix().local_minus_utc() as f64 / 60.0;
    let lon = ctx.settings.longitude;
    let sunrise_min = 720.0 - 4.0 * (lon + ha_deg) - eqtime + utc_offset_min;
    let sunset_min = 720.0 - 4.0 * (lon - ha_deg) - eqtime + utc_offset_min;

    let times = SunTimes {
        sunrise_min: sunrise_min.rem_euclid(1440.0),
        sunset_min: sunset_min.rem_euclid(1440.0),
    };
    log::debug!(
        "{}: sunrise {:.0}min sunset {:.0}min",
        date_key,
        times.sunrise_min,
        times.sunset_min
    );
    state.sun_cache.insert(date_key, times);
    Some(times)
}

pub fn get_node_types() -> Vec<NodeTypeDef> {
    vec![
        node_type(
            "time_of_day",
            "Time of Day",
            "timers",
            vec![],
            vec![port("active", "Active", PortType::Boolean)],
            vec![
                text_param("start", "Start (HH:MM)", "08:00"),
                text_param("stop", "Stop (HH:MM)", "22:00"),
            ],
        ),
        node_type(
            "sunrise_sunset",
            "Sunrise / Sunset",
            "timers",
            vec![],
            vec![port("active", "Active", PortType::Boolean)],
            vec![
                text_param("mode", "Mode (day/night)", "night"),
                num_param("on_offset_min", "On Offset (minutes)", 0.0),
                num_param("off_offset_min", "Off Offset (minutes)", 0.0),
            ],
        ),
        node_type(
            "days_of_week",
            "Days of the Week",
            "timers",
            vec![],
            vec![port("active", "Active", PortType::Boolean)],
            vec![
                toggle_param("mon", "Monday", true),
                toggle_param("tue", "Tuesday", true),
                toggle_param("wed", "Wednesday", true),
                toggle_param("thu", "Thursday", true),
                toggle_param("fri", "Friday", true),
                toggle_param("sat", "Saturday", true),
                toggle_param("sun", "Sunday", true),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_within_one_day() {
        // 08:00..22:00
        assert!(!is_within_window(7.0 * 60.0, 480.0, 1320.0));
        assert!(is_within_window(8.0 * 60.0, 480.0, 1320.0));
        assert!(is_within_window(12.0 * 60.0, 480.0, 1320.0));
        assert!(!is_within_window(22.0 * 60.0, 480.0, 1320.0));
    }

    #[test]
    fn window_crossing_midnight() {
        // 22:00..06:00 is active late evening and early morning.
        let start = 22.0 * 60.0;
        let stop = 6.0 * 60.0;
        assert!(is_within_window(23.0 * 60.0, start, stop));
        assert!(is_within_window(2.0 * 60.0, start, stop));
        assert!(!is_within_window(12.0 * 60.0, start, stop));
        assert!(is_within_window(start, start, stop));
        assert!(!is_within_window(stop, start, stop));
    }

    #[test]
    fn hhmm_parsing_accepts_valid_and_rejects_garbage() {
        assert_eq!(parse_hhmm("06:30").unwrap(), 390.0);
        assert_eq!(parse_hhmm("00:00").unwrap(), 0.0);
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("0630").is_err());
        assert!(parse_hhmm("ab:cd").is_err());
    }
}
