//! Owning container for operator handles and the edges between them.
//!
//! Readiness only looks at producer/consumer arity of each edge, so dummy edges order operators
//! exactly like data edges do.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::device::Place;
use crate::error::{GatherError, GatherResult};

use super::ids::OpId;
use super::op_handle::OpHandle;
use super::var_handle::{DummyVarHandle, VarHandleBase};

/// Graph that owns every variable handle and operator handle for its lifetime.
#[derive(Default)]
pub struct DependencyGraph {
    vars: Vec<Arc<VarHandleBase>>,
    ops: Vec<Box<dyn OpHandle>>,
    op_index: HashMap<OpId, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a data edge owned by the graph.
    pub fn new_var(
        &mut self,
        version: usize,
        scope_idx: usize,
        name: impl Into<String>,
        place: Place,
    ) -> Arc<VarHandleBase> {
        let var = VarHandleBase::data(version, scope_idx, name, place);
        self.vars.push(Arc::clone(&var));
        var
    }

    /// Creates an ordering-only edge owned by the graph.
    pub fn new_dummy_var(&mut self) -> Arc<VarHandleBase> {
        let var = Arc::new(VarHandleBase::Dummy(DummyVarHandle::new()));
        self.vars.push(Arc::clone(&var));
        var
    }

    /// Takes ownership of `op`. Edges it was already wired to are adopted as well.
    pub fn add_op(&mut self, op: Box<dyn OpHandle>) -> OpId {
        let id = op.id();
        for var in op.inputs().iter().chain(op.outputs()) {
            if !self.vars.iter().any(|known| Arc::ptr_eq(known, var)) {
                self.vars.push(Arc::clone(var));
            }
        }
        self.op_index.insert(id, self.ops.len());
        self.ops.push(op);
        id
    }

    pub fn op(&self, id: OpId) -> Option<&dyn OpHandle> {
        let index = *self.op_index.get(&id)?;
        Some(self.ops[index].as_ref())
    }

    fn op_mut(&mut self, id: OpId) -> GatherResult<&mut Box<dyn OpHandle>> {
        let index = *self
            .op_index
            .get(&id)
            .ok_or_else(|| GatherError::not_found(format!("operator {id}")))?;
        Ok(&mut self.ops[index])
    }

    /// Attaches `var` as an input of `op`. Reconnecting the same edge is a no-op.
    pub fn connect_input(&mut self, op: OpId, var: &Arc<VarHandleBase>) -> GatherResult<()> {
        let handle = self.op_mut(op)?;
        if !contains_edge(handle.inputs(), var) {
            handle.add_input(Arc::clone(var));
        }
        Ok(())
    }

    /// Attaches `var` as an output of `op`. An edge has at most one producer; reconnecting the
    /// same edge to its producer is a no-op.
    pub fn connect_output(&mut self, op: OpId, var: &Arc<VarHandleBase>) -> GatherResult<()> {
        if let Some(existing) = var.generated_op() {
            if existing != op {
                return Err(GatherError::construction(format!(
                    "edge already produced by {existing}, cannot also be produced by {op}"
                )));
            }
        }
        let handle = self.op_mut(op)?;
        if !contains_edge(handle.outputs(), var) {
            handle.add_output(Arc::clone(var));
        }
        Ok(())
    }

    pub fn vars(&self) -> &[Arc<VarHandleBase>] {
        &self.vars
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Number of distinct inputs of `op` whose producer is an operator in this graph.
    pub fn pending_input_count(&self, op: OpId) -> usize {
        let Some(handle) = self.op(op) else {
            return 0;
        };
        distinct_edges(handle.inputs())
            .into_iter()
            .filter(|var| {
                var.generated_op()
                    .is_some_and(|producer| self.op_index.contains_key(&producer))
            })
            .count()
    }

    /// Execution order honouring every edge, ties broken by insertion order.
    pub fn topological_order(&self) -> GatherResult<Vec<OpId>> {
        let mut pending: HashMap<OpId, usize> = self
            .ops
            .iter()
            .map(|op| (op.id(), self.pending_input_count(op.id())))
            .collect();
        let mut ready: VecDeque<OpId> = self
            .ops
            .iter()
            .map(|op| op.id())
            .filter(|id| pending[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.ops.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            let Some(op) = self.op(id) else { continue };
            for var in distinct_edges(op.outputs()) {
                if var.generated_op() != Some(id) {
                    continue;
                }
                let mut released: Vec<OpId> = Vec::new();
                for consumer in var.pending_ops() {
                    if released.contains(&consumer) {
                        continue;
                    }
                    released.push(consumer);
                    let Some(count) = pending.get_mut(&consumer) else {
                        continue;
                    };
                    *count = count.checked_sub(1).ok_or_else(|| {
                        GatherError::construction(format!(
                            "{consumer} released more often than it has producing inputs"
                        ))
                    })?;
                    if *count == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }

        if order.len() != self.ops.len() {
            return Err(GatherError::construction(format!(
                "dependency cycle: only {} of {} operators are schedulable",
                order.len(),
                self.ops.len()
            )));
        }
        Ok(order)
    }

    /// Runs every operator in topological order on the calling thread.
    pub fn run_all(&mut self, wait_before_completion: bool) -> GatherResult<()> {
        for id in self.topological_order()? {
            let op = self.op_mut(id)?;
            tracing::debug!(op = %id, name = op.name(), "run operator");
            op.run(wait_before_completion)?;
        }
        Ok(())
    }
}

fn contains_edge(edges: &[Arc<VarHandleBase>], var: &Arc<VarHandleBase>) -> bool {
    edges.iter().any(|known| Arc::ptr_eq(known, var))
}

/// `edges` with repeated handles removed, first occurrence kept.
fn distinct_edges(edges: &[Arc<VarHandleBase>]) -> Vec<&Arc<VarHandleBase>> {
    let mut seen: Vec<&Arc<VarHandleBase>> = Vec::with_capacity(edges.len());
    for edge in edges {
        if !seen.iter().any(|known| Arc::ptr_eq(known, edge)) {
            seen.push(edge);
        }
    }
    seen
}
