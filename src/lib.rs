pub mod devices;
pub mod dispatch;
pub mod models;
pub mod node_graph;
pub mod settings;

pub use node_graph::{GraphRuntime, TickServices};
