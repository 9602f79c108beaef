use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::models::schema::{NodeTiming, RuntimeSnapshot};
use crate::node_graph::change::ChangeDetector;
use crate::node_graph::debounce::Debouncer;

/// Cached solar times for one date, in minutes since local midnight.
#[derive(Clone, Copy)]
pub struct SunTimes {
    pub sunrise_min: f64,
    pub sunset_min: f64,
}

/// Mutable state threaded through every node execution. Values written in
/// one tick survive into the next, which is what gives readers of a failed
/// or skipped upstream node its last good output instead of nothing.
pub struct ExecutionState {
    /// Output slots keyed by (node_id, port_id).
    pub values: HashMap<(String, String), Value>,
    /// Human-readable per-node status for inspection ("sent", "suppressed", ...).
    pub node_status: HashMap<String, String>,
    /// Last boolean emitted by each edge-triggered source node.
    pub timer_states: HashMap<String, bool>,
    pub change: ChangeDetector,
    pub debounce: Debouncer,
    pub sun_cache: HashMap<String, SunTimes>,
    pub node_timings: Vec<NodeTiming>,
    warned: HashSet<String>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            node_status: HashMap::new(),
            timer_states: HashMap::new(),
            change: ChangeDetector::new(),
            debounce: Debouncer::new(),
            sun_cache: HashMap::new(),
            node_timings: Vec::new(),
            warned: HashSet::new(),
        }
    }

    pub fn set_value(&mut self, node_id: &str, port_id: &str, value: Value) {
        self.values
            .insert((node_id.to_string(), port_id.to_string()), value);
    }

    pub fn value(&self, node_id: &str, port_id: &str) -> Option<&Value> {
        self.values
            .get(&(node_id.to_string(), port_id.to_string()))
    }

    pub fn record_timing(&mut self, id: String, type_id: String, ms: f64) {
        self.node_timings.push(NodeTiming { id, type_id, ms });
    }

    /// Log a warning once per key for the lifetime of this state. A graph
    /// ticking once a second would otherwise repeat the same line forever.
    pub fn warn_once(&mut self, key: &str, message: &str) {
        if self.warned.insert(key.to_string()) {
            log::warn!("{}", message);
        }
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            values: self
                .values
                .iter()
                .map(|((node, port), v)| (format!("{}/{}", node, port), v.clone()))
                .collect(),
            timer_states: self.timer_states.clone(),
            sent_baselines: self.change.baselines().clone(),
        }
    }

    /// Rebuild state from a snapshot. Port ids never contain '/', so the
    /// split from the right is unambiguous even if a node id does.
    pub fn restore(&mut self, snapshot: RuntimeSnapshot) {
        self.values = snapshot
            .values
            .into_iter()
            .filter_map(|(key, v)| {
                let (node, port) = key.rsplit_once('/')?;
                Some(((node.to_string(), port.to_string()), v))
            })
            .collect();
        self.timer_states = snapshot.timer_states;
        self.change.restore(snapshot.sent_baselines);
    }
}
