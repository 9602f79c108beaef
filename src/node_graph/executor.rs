use chrono::{DateTime, Local};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::devices::registry::DeviceRegistry;
use crate::dispatch::CommandDispatcher;
use crate::models::schema::{Edge, Graph, NodeInstance, RuntimeSnapshot, TickSummary};
use crate::node_graph::state::ExecutionState;
use crate::node_graph::{nodes, NodeExecutionContext};
use crate::settings::AppSettings;

/// External services a tick needs. Passed by reference so the runtime owns
/// none of them and tests can hand in seeded stand-ins.
pub struct TickServices<'a> {
    pub registry: &'a DeviceRegistry,
    pub dispatcher: &'a CommandDispatcher,
    pub settings: &'a AppSettings,
}

/// Long-lived graph executor. Holds the active graph, its precomputed
/// topological order, and all cross-tick state. One `tick` evaluates every
/// node exactly once, upstream before downstream; it never awaits, so a
/// slow vendor can only ever delay its own dispatch queue, not the clock.
pub struct GraphRuntime {
    graph: Graph,
    order: Vec<String>,
    state: ExecutionState,
    tick: u64,
}

impl GraphRuntime {
    pub fn new() -> Self {
        Self {
            graph: Graph::default(),
            order: Vec::new(),
            state: ExecutionState::new(),
            tick: 0,
        }
    }

    pub fn with_graph(graph: Graph) -> Result<Self, String> {
        let mut runtime = Self::new();
        runtime.set_graph(graph)?;
        Ok(runtime)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Swap in a new graph, validating it and recomputing execution order.
    /// Cross-tick state is kept so nodes that survive the edit resume where
    /// they left off; on validation failure the old graph stays active.
    pub fn set_graph(&mut self, graph: Graph) -> Result<(), String> {
        let order = compute_order(&graph)?;
        self.graph = graph;
        self.order = order;
        Ok(())
    }

    /// Run one execution pass at the current wall-clock time.
    pub fn tick(&mut self, services: &TickServices) -> TickSummary {
        self.tick_at(services, Local::now())
    }

    /// Run one execution pass at an explicit time. A node failure is
    /// recorded and skipped over; every other node still executes, reading
    /// whatever the failed node last wrote on an earlier tick.
    pub fn tick_at(&mut self, services: &TickServices, now: DateTime<Local>) -> TickSummary {
        self.tick += 1;
        let tick_start = Instant::now();

        let mut state = std::mem::take(&mut self.state);
        state.node_timings.clear();

        let nodes_by_id: HashMap<&str, &NodeInstance> = self
            .graph
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();
        let mut incoming_edges: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &self.graph.edges {
            incoming_edges
                .entry(edge.to_node.as_str())
                .or_default()
                .push(edge);
        }

        let ctx = NodeExecutionContext {
            incoming_edges: &incoming_edges,
            registry: services.registry,
            dispatcher: services.dispatcher,
            settings: services.settings,
            now,
            tick: self.tick,
        };

        let mut executed = 0;
        let mut errors = Vec::new();
        for node_id in &self.order {
            let Some(node) = nodes_by_id.get(node_id.as_str()).copied() else {
                continue;
            };
            let node_start = Instant::now();
            match nodes::run_node(node, &ctx, &mut state) {
                Ok(()) => executed += 1,
                Err(e) => {
                    log::error!("Node '{}' ({}) failed: {}", node.id, node.type_id, e);
                    state
                        .node_status
                        .insert(node.id.clone(), format!("error: {}", e));
                    errors.push((node.id.clone(), e));
                }
            }
            let node_ms = node_start.elapsed().as_secs_f64() * 1000.0;
            state.record_timing(node.id.clone(), node.type_id.clone(), node_ms);
        }

        self.state = state;
        let total_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        log::debug!(
            "tick #{} executed={} errors={} total_ms={:.2}",
            self.tick,
            executed,
            errors.len(),
            total_ms
        );

        TickSummary {
            tick: self.tick,
            executed,
            errors,
            total_ms,
        }
    }

    pub fn value(&self, node_id: &str, port_id: &str) -> Option<&serde_json::Value> {
        self.state.value(node_id, port_id)
    }

    pub fn node_status(&self, node_id: &str) -> Option<&str> {
        self.state.node_status.get(node_id).map(|s| s.as_str())
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        self.state.snapshot()
    }

    /// Restore cross-tick state from a snapshot taken earlier, so a process
    /// restart does not re-send commands for device states already applied.
    pub fn restore(&mut self, snapshot: RuntimeSnapshot) {
        self.state.restore(snapshot);
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut ExecutionState {
        &mut self.state
    }
}

impl Default for GraphRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a graph and produce its topological execution order.
/// Rejects edges referencing unknown nodes, more than one edge into the
/// same input port, and cycles.
fn compute_order(graph: &Graph) -> Result<Vec<String>, String> {
    let mut dependency_graph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_indices = HashMap::new();

    for node in &graph.nodes {
        if node_indices.contains_key(node.id.as_str()) {
            return Err(format!("Duplicate node id '{}'", node.id));
        }
        let idx = dependency_graph.add_node(node.id.as_str());
        node_indices.insert(node.id.as_str(), idx);
    }

    let mut seen_ports: HashSet<(&str, &str)> = HashSet::new();
    for edge in &graph.edges {
        let Some(&from_idx) = node_indices.get(edge.from_node.as_str()) else {
            return Err(format!("Unknown from_node '{}' in edge", edge.from_node));
        };
        let Some(&to_idx) = node_indices.get(edge.to_node.as_str()) else {
            return Err(format!("Unknown to_node '{}' in edge", edge.to_node));
        };
        if !seen_ports.insert((edge.to_node.as_str(), edge.to_port.as_str())) {
            return Err(format!(
                "Input port '{}' of node '{}' has more than one incoming edge",
                edge.to_port, edge.to_node
            ));
        }
        dependency_graph.add_edge(from_idx, to_idx, ());
    }

    let sorted = toposort(&dependency_graph, None)
        .map_err(|_| "Graph has a cycle. Execution aborted.".to_string())?;

    Ok(sorted
        .into_iter()
        .map(|idx| dependency_graph[idx].to_string())
        .collect())
}
