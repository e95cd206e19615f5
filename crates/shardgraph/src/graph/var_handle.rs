//! Edges of the dependency graph.
//!
//! A data edge names a `(scope index, variable name, place)` binding; a dummy edge carries no
//! payload and only orders its producer before its consumers. Both record who produced them and
//! who consumes them so a scheduler can count readiness without inspecting payloads.

use std::sync::{Arc, Mutex};

use crate::device::Place;

use super::ids::OpId;

/// Producer and consumer bookkeeping shared by every edge kind.
#[derive(Debug, Default)]
pub struct EdgeLinks {
    generated_op: Mutex<Option<OpId>>,
    pending_ops: Mutex<Vec<OpId>>,
}

impl EdgeLinks {
    pub fn generated_op(&self) -> Option<OpId> {
        *self.generated_op.lock().expect("edge links poisoned")
    }

    pub fn set_generated_op(&self, op: Option<OpId>) {
        *self.generated_op.lock().expect("edge links poisoned") = op;
    }

    pub fn pending_ops(&self) -> Vec<OpId> {
        self.pending_ops.lock().expect("edge links poisoned").clone()
    }

    pub fn add_pending_op(&self, op: OpId) {
        self.pending_ops.lock().expect("edge links poisoned").push(op);
    }
}

/// Data dependency naming a variable in one device-local scope.
#[derive(Debug)]
pub struct VarHandle {
    version: usize,
    scope_idx: usize,
    name: String,
    place: Place,
    links: EdgeLinks,
}

impl VarHandle {
    pub fn new(version: usize, scope_idx: usize, name: impl Into<String>, place: Place) -> Self {
        VarHandle {
            version,
            scope_idx,
            name: name.into(),
            place,
            links: EdgeLinks::default(),
        }
    }

    pub fn version(&self) -> usize {
        self.version
    }

    /// Index into the owning operator's local-scope list.
    pub fn scope_idx(&self) -> usize {
        self.scope_idx
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn place(&self) -> Place {
        self.place
    }
}

/// Ordering-only dependency.
#[derive(Debug, Default)]
pub struct DummyVarHandle {
    links: EdgeLinks,
}

impl DummyVarHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dummy edge already attributed to `op`.
    pub fn generated_by(op: OpId) -> Self {
        let handle = Self::default();
        handle.links.set_generated_op(Some(op));
        handle
    }
}

/// Any edge an operator handle can consume or produce.
#[derive(Debug)]
pub enum VarHandleBase {
    Data(VarHandle),
    Dummy(DummyVarHandle),
}

impl VarHandleBase {
    pub fn data(version: usize, scope_idx: usize, name: impl Into<String>, place: Place) -> Arc<Self> {
        Arc::new(VarHandleBase::Data(VarHandle::new(
            version, scope_idx, name, place,
        )))
    }

    pub fn dummy() -> Arc<Self> {
        Arc::new(VarHandleBase::Dummy(DummyVarHandle::new()))
    }

    /// The data handle, or `None` for a dummy edge.
    pub fn as_var(&self) -> Option<&VarHandle> {
        match self {
            VarHandleBase::Data(var) => Some(var),
            VarHandleBase::Dummy(_) => None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, VarHandleBase::Dummy(_))
    }

    pub fn links(&self) -> &EdgeLinks {
        match self {
            VarHandleBase::Data(var) => &var.links,
            VarHandleBase::Dummy(dummy) => &dummy.links,
        }
    }

    pub fn generated_op(&self) -> Option<OpId> {
        self.links().generated_op()
    }

    pub fn pending_ops(&self) -> Vec<OpId> {
        self.links().pending_ops()
    }
}
