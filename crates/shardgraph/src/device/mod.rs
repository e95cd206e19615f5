//! Device identities and the asynchronous execution-context contract.
//!
//! Operators never touch device queues directly. They enqueue closures on a
//! [`DeviceContext`] and, when results must be observable, call [`DeviceContext::wait`].
//! Work on one context runs in enqueue order; nothing orders work across contexts except an
//! explicit wait.

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GatherResult;

/// Execution and memory locality of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Place {
    /// Host memory, sharded so several CPU devices can run side by side.
    Cpu(usize),
    /// Accelerator identified by ordinal.
    Accelerator(usize),
}

impl Default for Place {
    fn default() -> Self {
        Place::Cpu(0)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Cpu(shard) => write!(f, "cpu:{shard}"),
            Place::Accelerator(ordinal) => write!(f, "accel:{ordinal}"),
        }
    }
}

/// Unit of work scheduled on a device context.
pub type DeviceWork = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Asynchronous work queue owned by one device.
pub trait DeviceContext: Send + Sync {
    /// Device this context executes on.
    fn place(&self) -> Place;

    /// Schedules `work` and returns immediately.
    fn enqueue(&self, work: DeviceWork);

    /// Blocks until every previously enqueued item has finished.
    ///
    /// Returns the first failure recorded since the previous wait.
    fn wait(&self) -> GatherResult<()>;
}

/// Place-to-context binding held by every operator handle.
pub type DeviceContextMap = HashMap<Place, Arc<dyn DeviceContext>>;
