//! Execution dependency graph: edges, operator handles, and the gather operator.

pub mod dependency;
pub mod gather;
mod ids;
pub mod op_handle;
pub mod var_handle;

pub use dependency::DependencyGraph;
pub use gather::{GatherConfig, GatherOpHandle};
pub use ids::OpId;
pub use op_handle::{OpHandle, OpHandleBase};
pub use var_handle::{DummyVarHandle, EdgeLinks, VarHandle, VarHandleBase};
