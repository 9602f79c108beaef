use chrono::{DateTime, Local};
use std::collections::HashMap;

use crate::devices::registry::DeviceRegistry;
use crate::dispatch::CommandDispatcher;
use crate::models::schema::Edge;
use crate::settings::AppSettings;

/// Shared, read-only inputs that every node execution might need.
pub struct NodeExecutionContext<'a> {
    pub incoming_edges: &'a HashMap<&'a str, Vec<&'a Edge>>,
    pub registry: &'a DeviceRegistry,
    pub dispatcher: &'a CommandDispatcher,
    pub settings: &'a AppSettings,
    /// Wall clock sampled once at tick start so every node sees the same time.
    pub now: DateTime<Local>,
    pub tick: u64,
}
