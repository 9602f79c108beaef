use chrono::{DateTime, Duration, Local};
use serde_json::Value;
use std::collections::HashMap;

struct Entry {
    emitted: Value,
    candidate: Value,
    stable_since: DateTime<Local>,
}

/// Holds a value back until it has stopped changing for a settle delay.
/// The first value seen for a key is emitted immediately so a fresh graph
/// takes effect on its first tick; afterwards each change must stay stable
/// for the full delay before it replaces the emitted value.
#[derive(Default)]
pub struct Debouncer {
    entries: HashMap<String, Entry>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current candidate and get back the value that should be
    /// presented downstream right now.
    pub fn poll(
        &mut self,
        key: &str,
        candidate: Value,
        delay_ms: u64,
        now: DateTime<Local>,
    ) -> Value {
        if delay_ms == 0 {
            self.entries.insert(
                key.to_string(),
                Entry {
                    emitted: candidate.clone(),
                    candidate: candidate.clone(),
                    stable_since: now,
                },
            );
            return candidate;
        }

        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            emitted: candidate.clone(),
            candidate: candidate.clone(),
            stable_since: now,
        });

        if entry.candidate != candidate {
            entry.candidate = candidate;
            entry.stable_since = now;
        }

        if entry.candidate != entry.emitted
            && now - entry.stable_since >= Duration::milliseconds(delay_ms as i64)
        {
            entry.emitted = entry.candidate.clone();
        }

        entry.emitted.clone()
    }
}
