pub mod change;
pub mod debounce;
pub mod executor;
pub mod node_execution_context;
pub mod nodes;
pub mod state;

#[cfg(test)]
mod tests;

pub use executor::{GraphRuntime, TickServices};
pub use node_execution_context::NodeExecutionContext;
