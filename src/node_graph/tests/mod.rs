use chrono::{DateTime, Local, TimeZone};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::devices::registry::DeviceRegistry;
use crate::devices::testing::{RecordingAdapter, SentCommand};
use crate::dispatch::{CommandDispatcher, DispatchPolicy};
use crate::models::device::{DeviceInfo, Vendor};
use crate::models::schema::{Edge, Graph, NodeInstance};
use crate::node_graph::{GraphRuntime, TickServices};
use crate::settings::AppSettings;

fn node(id: &str, type_id: &str, params: &[(&str, Value)]) -> NodeInstance {
    NodeInstance {
        id: id.into(),
        type_id: type_id.into(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>(),
        position_x: None,
        position_y: None,
    }
}

fn edge(from: &str, from_port: &str, to: &str, to_port: &str) -> Edge {
    Edge {
        id: format!("{}:{}->{}:{}", from, from_port, to, to_port),
        from_node: from.into(),
        from_port: from_port.into(),
        to_node: to.into(),
        to_port: to_port.into(),
    }
}

struct Harness {
    registry: DeviceRegistry,
    dispatcher: CommandDispatcher,
    settings: AppSettings,
}

impl Harness {
    fn new() -> Self {
        Self {
            registry: DeviceRegistry::new(),
            dispatcher: CommandDispatcher::new(),
            settings: AppSettings::default(),
        }
    }

    fn services(&self) -> TickServices<'_> {
        TickServices {
            registry: &self.registry,
            dispatcher: &self.dispatcher,
            settings: &self.settings,
        }
    }
}

fn noon() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
}

#[test]
fn a_failing_node_does_not_stop_the_rest_of_the_tick() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![
            node("src", "hsv_control", &[("brightness", json!(128.0))]),
            node("bad", "gain", &[("curve", json!("not json"))]),
            node("ok", "pass_through", &[]),
        ],
        edges: vec![
            edge("src", "color", "bad", "in"),
            edge("src", "color", "ok", "in"),
        ],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    let summary = runtime.tick_at(&harness.services(), noon());

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].0, "bad");
    assert!(summary.errors[0].1.contains("invalid curve"));
    assert_eq!(summary.executed, 2);
    // The healthy branch still produced output.
    assert!(runtime.value("ok", "out").is_some());
    assert!(runtime.value("bad", "out").is_none());
    assert!(runtime.node_status("bad").unwrap().starts_with("error"));
}

#[test]
fn time_of_day_emits_on_transitions_only() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![node(
            "timer",
            "time_of_day",
            &[("start", json!("08:00")), ("stop", json!("22:00"))],
        )],
        edges: vec![],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    // First evaluation emits the baseline.
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("timer", "active"), Some(&json!(true)));

    // Same state on the next tick: the slot is not rewritten.
    runtime
        .state_mut()
        .values
        .remove(&("timer".to_string(), "active".to_string()));
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("timer", "active"), None);

    // Crossing the window boundary writes the new state.
    let late = Local.with_ymd_and_hms(2026, 8, 25, 23, 0, 0).unwrap();
    runtime.tick_at(&harness.services(), late);
    assert_eq!(runtime.value("timer", "active"), Some(&json!(false)));
}

#[test]
fn overnight_window_is_active_across_midnight() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![node(
            "night",
            "time_of_day",
            &[("start", json!("22:00")), ("stop", json!("06:00"))],
        )],
        edges: vec![],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    let two_am = Local.with_ymd_and_hms(2026, 8, 25, 2, 0, 0).unwrap();
    runtime.tick_at(&harness.services(), two_am);
    assert_eq!(runtime.value("night", "active"), Some(&json!(true)));

    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("night", "active"), Some(&json!(false)));
}

#[test]
fn days_of_week_respects_the_day_toggles() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![node("days", "days_of_week", &[("mon", json!(0.0))])],
        edges: vec![],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    // 2026-08-24 is a Monday.
    let monday = Local.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap();
    runtime.tick_at(&harness.services(), monday);
    assert_eq!(runtime.value("days", "active"), Some(&json!(false)));

    let tuesday = Local.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
    runtime.tick_at(&harness.services(), tuesday);
    assert_eq!(runtime.value("days", "active"), Some(&json!(true)));
}

#[test]
fn toggle_flips_only_on_the_rising_edge() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![node("btn", "pass_through", &[]), node("t", "toggle", &[])],
        edges: vec![edge("btn", "out", "t", "in")],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    runtime.state_mut().set_value("btn", "out", json!(true));
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("t", "out"), Some(&json!(true)));

    // Input held high: no further flips.
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("t", "out"), Some(&json!(true)));

    runtime.state_mut().set_value("btn", "out", json!(false));
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("t", "out"), Some(&json!(true)));

    // Next rising edge flips back off.
    runtime.state_mut().set_value("btn", "out", json!(true));
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.value("t", "out"), Some(&json!(false)));
}

fn lamp_graph() -> Graph {
    Graph {
        nodes: vec![
            node(
                "color",
                "hsv_control",
                &[("hue", json!(0.6)), ("brightness", json!(200.0))],
            ),
            node("lamp", "hue_light", &[("device", json!("Desk Lamp"))]),
        ],
        edges: vec![edge("color", "color", "lamp", "in")],
    }
}

fn seeded_harness(adapter: Arc<RecordingAdapter>) -> Harness {
    let mut harness = Harness::new();
    harness.registry.seed(
        Vendor::Hue,
        vec![DeviceInfo {
            id: "7".into(),
            name: "Desk Lamp".into(),
            model: Some("LCT007".into()),
        }],
    );
    harness
        .dispatcher
        .register(adapter, DispatchPolicy::with_cooldown_ms(10));
    harness
}

#[tokio::test]
async fn unchanged_device_state_sends_exactly_one_command() {
    let adapter = Arc::new(RecordingAdapter::new(Vendor::Hue));
    let harness = seeded_harness(adapter.clone());
    let mut runtime = GraphRuntime::with_graph(lamp_graph()).expect("valid graph");

    runtime.tick_at(&harness.services(), noon());
    runtime.tick_at(&harness.services(), noon());
    runtime.tick_at(&harness.services(), noon());
    tokio::time::sleep(Duration::from_millis(80)).await;

    let sent = adapter.sent_commands();
    assert_eq!(sent.len(), 1);
    // The registry resolved the name to the real id.
    match &sent[0].1 {
        SentCommand::Color { device_id, .. } => assert_eq!(device_id, "7"),
        other => panic!("expected a color command, got {:?}", other),
    }
    assert_eq!(runtime.node_status("lamp"), Some("suppressed"));
}

#[tokio::test]
async fn restored_snapshot_does_not_resend_applied_state() {
    let adapter = Arc::new(RecordingAdapter::new(Vendor::Hue));
    let harness = seeded_harness(adapter.clone());

    let mut runtime = GraphRuntime::with_graph(lamp_graph()).expect("valid graph");
    runtime.tick_at(&harness.services(), noon());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.sent_commands().len(), 1);

    let snapshot = runtime.snapshot();

    // Fresh process, same graph, restored state: nothing to send.
    let mut restarted = GraphRuntime::with_graph(lamp_graph()).expect("valid graph");
    restarted.restore(snapshot);
    restarted.tick_at(&harness.services(), noon());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(adapter.sent_commands().len(), 1);
    assert_eq!(restarted.node_status("lamp"), Some("suppressed"));
}

#[tokio::test]
async fn kasa_plug_follows_a_boolean_input() {
    let mut harness = Harness::new();
    let adapter = Arc::new(RecordingAdapter::new(Vendor::Kasa));
    harness
        .dispatcher
        .register(adapter.clone(), DispatchPolicy::with_cooldown_ms(10));

    let graph = Graph {
        nodes: vec![
            node("btn", "pass_through", &[]),
            node("plug", "kasa_plug", &[("device", json!("plug-1"))]),
        ],
        edges: vec![edge("btn", "out", "plug", "in")],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    runtime.state_mut().set_value("btn", "out", json!(true));
    runtime.tick_at(&harness.services(), noon());
    runtime.state_mut().set_value("btn", "out", json!(false));
    runtime.tick_at(&harness.services(), noon());
    tokio::time::sleep(Duration::from_millis(80)).await;

    let sent = adapter.sent_commands();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1].1,
        SentCommand::Power {
            device_id: "plug-1".into(),
            on: false
        }
    );
}

#[tokio::test]
async fn malformed_sink_payload_is_skipped_not_an_error() {
    let adapter = Arc::new(RecordingAdapter::new(Vendor::Hue));
    let harness = seeded_harness(adapter.clone());
    let graph = Graph {
        nodes: vec![
            node("src", "pass_through", &[]),
            node("lamp", "hue_light", &[("device", json!("Desk Lamp"))]),
        ],
        edges: vec![edge("src", "out", "lamp", "in")],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");
    runtime
        .state_mut()
        .set_value("src", "out", json!({ "volume": 10 }));

    // The bad value persists in its slot; every tick must stay quiet rather
    // than re-reporting the same failure.
    for _ in 0..3 {
        let summary = runtime.tick_at(&harness.services(), noon());
        assert!(summary.errors.is_empty());
    }
    assert_eq!(runtime.node_status("lamp"), Some("incomplete flow"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(adapter.sent_commands().is_empty());

    // A good payload afterwards flows through normally.
    runtime.state_mut().set_value("src", "out", json!(true));
    let summary = runtime.tick_at(&harness.services(), noon());
    assert!(summary.errors.is_empty());
    assert_eq!(runtime.node_status("lamp"), Some("sent"));
}

#[test]
fn sunrise_sunset_offsets_shift_each_edge_independently() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![node(
            "sun",
            "sunrise_sunset",
            &[
                ("mode", json!("night")),
                ("on_offset_min", json!(-30.0)),
                ("off_offset_min", json!(60.0)),
            ],
        )],
        edges: vec![],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");
    // Fixed solar times: sunrise 06:00, sunset 18:00. On at 17:30
    // (30 min early), off at 07:00 (an hour late).
    runtime.state_mut().sun_cache.insert(
        "2026-08-25".into(),
        crate::node_graph::state::SunTimes {
            sunrise_min: 360.0,
            sunset_min: 1080.0,
        },
    );

    let at = |h, m| Local.with_ymd_and_hms(2026, 8, 25, h, m, 0).unwrap();
    runtime.tick_at(&harness.services(), at(17, 45));
    assert_eq!(runtime.value("sun", "active"), Some(&json!(true)));
    runtime.tick_at(&harness.services(), at(6, 30));
    assert_eq!(runtime.value("sun", "active"), Some(&json!(true)));
    runtime.tick_at(&harness.services(), at(7, 30));
    assert_eq!(runtime.value("sun", "active"), Some(&json!(false)));
    runtime.tick_at(&harness.services(), at(17, 15));
    assert_eq!(runtime.value("sun", "active"), Some(&json!(false)));
}

#[test]
fn unregistered_vendor_leaves_the_baseline_unset() {
    // No dispatcher registered: the command cannot be queued, so the same
    // state must be attempted again on the next tick instead of being
    // swallowed by change detection.
    let harness = Harness::new();
    let mut runtime = GraphRuntime::with_graph(lamp_graph()).expect("valid graph");

    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.node_status("lamp"), Some("dispatcher unavailable"));
    runtime.tick_at(&harness.services(), noon());
    assert_eq!(runtime.node_status("lamp"), Some("dispatcher unavailable"));
}

#[test]
fn light_merge_combines_power_and_color_branches() {
    let harness = Harness::new();
    let graph = Graph {
        nodes: vec![
            node(
                "window",
                "time_of_day",
                &[("start", json!("08:00")), ("stop", json!("22:00"))],
            ),
            node("hsv", "hsv_control", &[("hue", json!(0.1))]),
            node("merge", "light_merge", &[]),
        ],
        edges: vec![
            edge("window", "active", "merge", "power"),
            edge("hsv", "color", "merge", "color"),
        ],
    };
    let mut runtime = GraphRuntime::with_graph(graph).expect("valid graph");

    runtime.tick_at(&harness.services(), noon());
    let merged = runtime.value("merge", "out").expect("merged output");
    assert_eq!(merged["on"], json!(true));
    assert_eq!(merged["color"]["hue"], json!(0.1));

    let late = Local.with_ymd_and_hms(2026, 8, 25, 23, 30, 0).unwrap();
    runtime.tick_at(&harness.services(), late);
    let merged = runtime.value("merge", "out").expect("merged output");
    assert_eq!(merged["on"], json!(false));
}
