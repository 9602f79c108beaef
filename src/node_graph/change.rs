use serde_json::Value;
use std::collections::HashMap;

/// Remembers the last payload actually sent per key and suppresses repeats.
/// Keys are owned by the sink node that records them ("node_id/vendor:device"),
/// so two nodes driving the same physical device do not share a baseline.
///
/// Comparison is structural `serde_json::Value` equality, so two payloads
/// whose object fields were assembled in different orders still match.
#[derive(Default)]
pub struct ChangeDetector {
    baselines: HashMap<String, Value>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Would this payload be a change from the last recorded one?
    /// Unknown keys always count as changed.
    pub fn changed(&self, key: &str, payload: &Value) -> bool {
        self.baselines.get(key) != Some(payload)
    }

    /// Record a payload as sent. Call only after the command was actually
    /// handed to the dispatcher, otherwise a dropped command would be
    /// suppressed forever.
    pub fn record(&mut self, key: &str, payload: Value) {
        self.baselines.insert(key.to_string(), payload);
    }

    pub fn baselines(&self) -> &HashMap<String, Value> {
        &self.baselines
    }

    pub fn restore(&mut self, baselines: HashMap<String, Value>) {
        self.baselines = baselines;
    }
}
