//! Shared state and entry point for operator handles.

use std::sync::Arc;

use crate::device::{DeviceContext, DeviceContextMap, Place};
use crate::error::{GatherError, GatherResult};

use super::ids::{next_op_id, OpId};
use super::var_handle::{VarHandle, VarHandleBase};

/// Inputs, outputs and device contexts common to every operator handle.
pub struct OpHandleBase {
    id: OpId,
    inputs: Vec<Arc<VarHandleBase>>,
    outputs: Vec<Arc<VarHandleBase>>,
    dev_ctxes: DeviceContextMap,
}

impl Default for OpHandleBase {
    fn default() -> Self {
        Self::new()
    }
}

impl OpHandleBase {
    pub fn new() -> Self {
        OpHandleBase {
            id: next_op_id(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            dev_ctxes: DeviceContextMap::new(),
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn inputs(&self) -> &[Arc<VarHandleBase>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<VarHandleBase>] {
        &self.outputs
    }

    /// Data inputs in order, skipping dummy edges.
    pub fn real_inputs(&self) -> Vec<&VarHandle> {
        self.inputs.iter().filter_map(|var| var.as_var()).collect()
    }

    /// Data outputs in order, skipping dummy edges.
    pub fn real_outputs(&self) -> Vec<&VarHandle> {
        self.outputs.iter().filter_map(|var| var.as_var()).collect()
    }

    /// Appends `var` as an input and records this op as one of its consumers.
    pub fn add_input(&mut self, var: Arc<VarHandleBase>) {
        var.links().add_pending_op(self.id);
        self.inputs.push(var);
    }

    /// Appends `var` as an output and records this op as its producer.
    pub fn add_output(&mut self, var: Arc<VarHandleBase>) {
        var.links().set_generated_op(Some(self.id));
        self.outputs.push(var);
    }

    pub fn set_device_context(&mut self, place: Place, ctx: Arc<dyn DeviceContext>) {
        self.dev_ctxes.insert(place, ctx);
    }

    pub fn device_context(&self, place: Place) -> Option<&Arc<dyn DeviceContext>> {
        self.dev_ctxes.get(&place)
    }

    /// Like [`device_context`](Self::device_context) but a missing binding is an error.
    pub fn require_device_context(&self, place: Place) -> GatherResult<Arc<dyn DeviceContext>> {
        self.dev_ctxes
            .get(&place)
            .cloned()
            .ok_or_else(|| GatherError::not_found(format!("device context for {place}")))
    }

    pub fn device_contexts(&self) -> &DeviceContextMap {
        &self.dev_ctxes
    }

    /// Waits on the contexts of `places`, each at most once.
    ///
    /// Every context is drained even after a failure; the first failure is returned.
    pub fn wait_places(&self, places: &[Place]) -> GatherResult<()> {
        let mut waited: Vec<Place> = Vec::with_capacity(places.len());
        let mut first_err = None;
        for &place in places {
            if waited.contains(&place) {
                continue;
            }
            waited.push(place);
            let result = match self.dev_ctxes.get(&place) {
                Some(ctx) => ctx.wait(),
                None => Err(GatherError::not_found(format!("device context for {place}"))),
            };
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Waits on every registered context.
    pub fn wait_all(&self) -> GatherResult<()> {
        let mut places: Vec<Place> = self.dev_ctxes.keys().copied().collect();
        places.sort();
        self.wait_places(&places)
    }
}

/// Node of the execution dependency graph.
///
/// Implementors provide [`run_impl`](OpHandle::run_impl); schedulers call
/// [`run`](OpHandle::run).
pub trait OpHandle: Send {
    /// Short operator type name used in logs.
    fn name(&self) -> &str;

    fn base(&self) -> &OpHandleBase;

    fn base_mut(&mut self) -> &mut OpHandleBase;

    /// Enqueues the operator's device work and returns the places it touched.
    fn run_impl(&mut self) -> GatherResult<Vec<Place>>;

    /// Runs the operator. With `wait_before_completion`, blocks until every touched device has
    /// drained; otherwise the caller must wait before reading outputs.
    fn run(&mut self, wait_before_completion: bool) -> GatherResult<()> {
        let touched = self.run_impl()?;
        if wait_before_completion {
            self.base().wait_places(&touched)?;
        }
        Ok(())
    }

    fn id(&self) -> OpId {
        self.base().id()
    }

    fn inputs(&self) -> &[Arc<VarHandleBase>] {
        self.base().inputs()
    }

    fn outputs(&self) -> &[Arc<VarHandleBase>] {
        self.base().outputs()
    }

    fn add_input(&mut self, var: Arc<VarHandleBase>) {
        self.base_mut().add_input(var);
    }

    fn add_output(&mut self, var: Arc<VarHandleBase>) {
        self.base_mut().add_output(var);
    }

    fn set_device_context(&mut self, place: Place, ctx: Arc<dyn DeviceContext>) {
        self.base_mut().set_device_context(place, ctx);
    }
}
