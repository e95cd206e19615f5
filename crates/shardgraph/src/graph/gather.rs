//! Gathers the SelectedRows held by several device-local scopes into one output variable.
//!
//! Row ids are concatenated in input order without sorting or deduplication. Each input's value
//! rows are copied into the matching row range of a freshly allocated output buffer, and the copy
//! is enqueued on the context of the input's own place. No barrier separates the copies; the
//! caller waits (or asks `run` to wait) before reading the output.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceContext, Place};
use crate::env;
use crate::error::{GatherError, GatherResult};
use crate::scope::Scope;
use crate::tensor::{DType, DenseTensor, SelectedRows, Shape};

use super::op_handle::{OpHandle, OpHandleBase};
use super::var_handle::VarHandle;

/// Per-handle knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Reject inputs that disagree on height, dtype or feature shape, or whose value row count
    /// differs from their row-id count. When off, the first input's metadata wins.
    pub validate_inputs: bool,
}

impl Default for GatherConfig {
    fn default() -> Self {
        GatherConfig {
            validate_inputs: env::gather_validate_enabled(),
        }
    }
}

/// One resolved input: where its copy runs and what it copies.
struct GatherSource {
    place: Place,
    ctx: Arc<dyn DeviceContext>,
    value: DenseTensor,
    row_offset: usize,
}

/// Element layout every input with rows must agree on.
#[derive(Debug, PartialEq)]
struct RowLayout {
    dtype: DType,
    feature_dims: Vec<usize>,
}

/// Operator handle merging one SelectedRows per device into a single output.
pub struct GatherOpHandle {
    base: OpHandleBase,
    local_scopes: Vec<Arc<Scope>>,
    places: Vec<Place>,
    config: GatherConfig,
}

impl GatherOpHandle {
    /// Binds scope `i` to place `i`. Device contexts are registered afterwards.
    pub fn new(local_scopes: Vec<Arc<Scope>>, places: Vec<Place>) -> GatherResult<Self> {
        if local_scopes.len() != places.len() {
            return Err(GatherError::construction(format!(
                "gather needs one place per local scope, got {} scopes and {} places",
                local_scopes.len(),
                places.len()
            )));
        }
        Ok(GatherOpHandle {
            base: OpHandleBase::new(),
            local_scopes,
            places,
            config: GatherConfig::default(),
        })
    }

    pub fn with_config(mut self, config: GatherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> GatherConfig {
        self.config
    }

    pub fn local_scopes(&self) -> &[Arc<Scope>] {
        &self.local_scopes
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    fn scope_at(&self, idx: usize) -> GatherResult<&Arc<Scope>> {
        self.local_scopes.get(idx).ok_or_else(|| {
            GatherError::not_found(format!(
                "local scope {idx} (gather has {} scopes)",
                self.local_scopes.len()
            ))
        })
    }

    fn read_input(&self, handle: &VarHandle) -> GatherResult<SelectedRows> {
        let scope = self.scope_at(handle.scope_idx())?;
        let var = scope.find_var(handle.name()).ok_or_else(|| {
            GatherError::not_found(format!(
                "input variable '{}' in scope {}",
                handle.name(),
                handle.scope_idx()
            ))
        })?;
        var.selected_rows()
    }

    fn output_handle(&self) -> GatherResult<&VarHandle> {
        let outputs = self.base.real_outputs();
        match outputs.as_slice() {
            [single] => Ok(single),
            other => Err(GatherError::construction(format!(
                "gather expects exactly one data output, found {}",
                other.len()
            ))),
        }
    }

    fn check_height(
        &self,
        height: i64,
        handle: &VarHandle,
        selected: &SelectedRows,
    ) -> GatherResult<()> {
        if !self.config.validate_inputs || selected.height() == height {
            return Ok(());
        }
        Err(GatherError::inconsistent(format!(
            "input '{}' on {} has height {}, expected {}",
            handle.name(),
            handle.place(),
            selected.height(),
            height
        )))
    }

    /// Compares dtype and feature shape. Only called for inputs that contribute rows.
    fn check_features(
        &self,
        layout: &RowLayout,
        handle: &VarHandle,
        value: &DenseTensor,
    ) -> GatherResult<()> {
        if !self.config.validate_inputs
            || (value.dtype() == layout.dtype && value.shape().feature_dims() == layout.feature_dims)
        {
            return Ok(());
        }
        Err(GatherError::inconsistent(format!(
            "input '{}' on {} has {} feature shape {:?}, expected {} {:?}",
            handle.name(),
            handle.place(),
            value.dtype().name(),
            value.shape().feature_dims(),
            layout.dtype.name(),
            layout.feature_dims
        )))
    }
}

impl OpHandle for GatherOpHandle {
    fn name(&self) -> &str {
        "gather"
    }

    fn base(&self) -> &OpHandleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpHandleBase {
        &mut self.base
    }

    fn run_impl(&mut self) -> GatherResult<Vec<Place>> {
        let in_handles = self.base.real_inputs();
        let out_handle = self.output_handle()?;

        // Resolve every input and context before the output is touched.
        let mut rows: Vec<i64> = Vec::new();
        let mut height: Option<i64> = None;
        let mut layout: Option<RowLayout> = None;
        let mut total_rows = 0usize;
        let mut sources: Vec<GatherSource> = Vec::with_capacity(in_handles.len());
        for handle in &in_handles {
            let selected = self.read_input(handle)?;
            let value = selected.value();
            match height {
                Some(height) => self.check_height(height, handle, &selected)?,
                None => height = Some(selected.height()),
            }
            // A source without rows contributes nothing, whatever its value shape.
            if value.shape().rows() > 0 {
                match &layout {
                    Some(layout) => self.check_features(layout, handle, value)?,
                    None => {
                        layout = Some(RowLayout {
                            dtype: value.dtype(),
                            feature_dims: value.shape().feature_dims().to_vec(),
                        })
                    }
                }
            }
            if self.config.validate_inputs && !selected.rows_match_value() {
                return Err(GatherError::inconsistent(format!(
                    "input '{}' on {} lists {} rows but its value has {}",
                    handle.name(),
                    handle.place(),
                    selected.rows().len(),
                    value.shape().rows()
                )));
            }
            let ctx = self.base.require_device_context(handle.place())?;
            sources.push(GatherSource {
                place: handle.place(),
                ctx,
                value: value.clone(),
                row_offset: total_rows,
            });
            rows.extend_from_slice(selected.rows());
            total_rows += value.shape().rows();
        }

        let height = height.unwrap_or(0);
        let layout = layout.unwrap_or(RowLayout {
            dtype: DType::F32,
            feature_dims: Vec::new(),
        });

        let out_scope = self.scope_at(out_handle.scope_idx())?;
        let out_var = out_scope.find_var(out_handle.name()).ok_or_else(|| {
            GatherError::not_found(format!(
                "output variable '{}' in scope {}",
                out_handle.name(),
                out_handle.scope_idx()
            ))
        })?;
        let out_value = DenseTensor::zeros(
            Shape::with_leading(total_rows, &layout.feature_dims),
            layout.dtype,
            out_handle.place(),
        );
        out_var.with_selected_rows_mut(|out| {
            out.set_height(height);
            out.set_rows(rows);
            out.set_value(out_value.clone());
        })?;

        tracing::debug!(
            op = %self.base.id(),
            inputs = sources.len(),
            rows = total_rows,
            height,
            out = %out_handle.place(),
            "gather selected rows"
        );

        let mut touched: Vec<Place> = Vec::with_capacity(sources.len());
        for source in sources.into_iter().filter(|source| source.value.shape().rows() > 0) {
            let dst = out_value.clone();
            let GatherSource {
                place,
                ctx,
                value,
                row_offset,
            } = source;
            tracing::trace!(
                src = %place,
                row_offset,
                rows = value.shape().rows(),
                "enqueue gather copy"
            );
            ctx.enqueue(Box::new(move || dst.copy_rows_from(row_offset, &value)));
            if !touched.contains(&place) {
                touched.push(place);
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::device::DeviceWork;
    use crate::graph::var_handle::VarHandleBase;

    /// Holds work until `wait`, so tests can observe un-synchronized state.
    struct DeferredContext {
        place: Place,
        queue: Mutex<Vec<DeviceWork>>,
    }

    impl DeferredContext {
        fn new(place: Place) -> Arc<Self> {
            Arc::new(DeferredContext {
                place,
                queue: Mutex::new(Vec::new()),
            })
        }

        fn pending(&self) -> usize {
            self.queue.lock().unwrap().len()
        }
    }

    impl DeviceContext for DeferredContext {
        fn place(&self) -> Place {
            self.place
        }

        fn enqueue(&self, work: DeviceWork) {
            self.queue.lock().unwrap().push(work);
        }

        fn wait(&self) -> GatherResult<()> {
            let work: Vec<DeviceWork> = std::mem::take(&mut *self.queue.lock().unwrap());
            for item in work {
                item().map_err(|err| GatherError::device(self.place, err.to_string()))?;
            }
            Ok(())
        }
    }

    fn selected(height: i64, rows: Vec<i64>, cols: usize, start: f32, place: Place) -> SelectedRows {
        let values: Vec<f32> = (0..rows.len() * cols).map(|i| start + i as f32).collect();
        let value = DenseTensor::from_vec(Shape::new([rows.len(), cols]), values, place).unwrap();
        SelectedRows::new(height, rows, value)
    }

    struct Fixture {
        scopes: Vec<Arc<Scope>>,
        ctxes: Vec<Arc<DeferredContext>>,
        op: GatherOpHandle,
    }

    fn fixture(devices: usize) -> Fixture {
        let root = Scope::new_root();
        let places: Vec<Place> = (0..devices).map(Place::Cpu).collect();
        let scopes: Vec<Arc<Scope>> = (0..devices).map(|_| root.new_child_scope()).collect();
        scopes[0].var("out");
        let mut op = GatherOpHandle::new(scopes.clone(), places.clone())
            .unwrap()
            .with_config(GatherConfig {
                validate_inputs: true,
            });
        let ctxes: Vec<Arc<DeferredContext>> =
            places.iter().map(|&p| DeferredContext::new(p)).collect();
        for (place, ctx) in places.iter().zip(&ctxes) {
            op.set_device_context(*place, Arc::clone(ctx) as Arc<dyn DeviceContext>);
            op.add_input(VarHandleBase::data(1, place_index(*place), "input", *place));
        }
        op.add_output(VarHandleBase::data(2, 0, "out", places[0]));
        Fixture { scopes, ctxes, op }
    }

    fn place_index(place: Place) -> usize {
        match place {
            Place::Cpu(i) | Place::Accelerator(i) => i,
        }
    }

    #[test]
    fn run_without_wait_leaves_copies_enqueued() {
        let mut fx = fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(10, vec![1, 5], 2, 0.0, Place::Cpu(0)));
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(10, vec![5], 2, 100.0, Place::Cpu(1)));

        fx.op.run(false).unwrap();
        assert_eq!(fx.ctxes[0].pending(), 1);
        assert_eq!(fx.ctxes[1].pending(), 1);

        let out = fx.scopes[0].find_var("out").unwrap().selected_rows().unwrap();
        assert_eq!(out.rows(), &[1, 5, 5]);
        assert_eq!(out.height(), 10);
        assert_eq!(out.value().shape().dims(), &[3, 2]);
        assert_eq!(out.value().place(), Place::Cpu(0));

        for ctx in &fx.ctxes {
            ctx.wait().unwrap();
        }
        assert_eq!(
            out.value().to_vec::<f32>(),
            vec![0.0, 1.0, 2.0, 3.0, 100.0, 101.0]
        );
    }

    #[test]
    fn run_with_wait_drains_touched_contexts() {
        let mut fx = fixture(3);
        for (i, scope) in fx.scopes.iter().enumerate() {
            scope
                .var("input")
                .set_selected_rows(selected(8, vec![i as i64], 1, i as f32, Place::Cpu(i)));
        }
        fx.op.run(true).unwrap();
        assert!(fx.ctxes.iter().all(|ctx| ctx.pending() == 0));
        let out = fx.scopes[0].var("out").selected_rows().unwrap();
        assert_eq!(out.value().to_vec::<f32>(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn missing_input_variable_is_not_found() {
        let mut fx = fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(4, vec![0], 1, 0.0, Place::Cpu(0)));
        let err = fx.op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::NotFound { .. }), "{err}");
        // Nothing was written before the failure was detected.
        assert!(!fx.scopes[0].var("out").is_initialized());
    }

    #[test]
    fn dense_input_is_type_mismatch() {
        let mut fx = fixture(1);
        fx.scopes[0].var("input").set_dense_tensor(DenseTensor::empty(Place::Cpu(0)));
        let err = fx.op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn missing_output_variable_is_not_found() {
        let root = Scope::new_root();
        let scope = root.new_child_scope();
        scope
            .var("input")
            .set_selected_rows(selected(4, vec![0], 1, 0.0, Place::Cpu(0)));
        let mut op = GatherOpHandle::new(vec![scope], vec![Place::Cpu(0)]).unwrap();
        op.set_device_context(Place::Cpu(0), DeferredContext::new(Place::Cpu(0)));
        op.add_input(VarHandleBase::data(1, 0, "input", Place::Cpu(0)));
        op.add_output(VarHandleBase::data(2, 0, "out", Place::Cpu(0)));
        let err = op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::NotFound { .. }), "{err}");
    }

    #[test]
    fn missing_device_context_is_not_found() {
        let root = Scope::new_root();
        let scope = root.new_child_scope();
        scope
            .var("input")
            .set_selected_rows(selected(4, vec![0], 1, 0.0, Place::Cpu(0)));
        scope.var("out");
        let mut op = GatherOpHandle::new(vec![scope], vec![Place::Cpu(0)]).unwrap();
        op.add_input(VarHandleBase::data(1, 0, "input", Place::Cpu(0)));
        op.add_output(VarHandleBase::data(2, 0, "out", Place::Cpu(0)));
        let err = op.run(false).unwrap_err();
        assert!(matches!(err, GatherError::NotFound { .. }), "{err}");
    }

    #[test]
    fn divergent_height_is_rejected_when_validating() {
        let mut fx = fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(10, vec![0], 2, 0.0, Place::Cpu(0)));
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(12, vec![0], 2, 0.0, Place::Cpu(1)));
        let err = fx.op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::InconsistentInput { .. }), "{err}");
    }

    #[test]
    fn divergent_feature_shape_is_rejected_when_validating() {
        let mut fx = fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(10, vec![0], 2, 0.0, Place::Cpu(0)));
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(10, vec![0], 3, 0.0, Place::Cpu(1)));
        let err = fx.op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::InconsistentInput { .. }), "{err}");
    }

    fn permissive_fixture(devices: usize) -> Fixture {
        let mut fx = fixture(devices);
        let places: Vec<Place> = (0..devices).map(Place::Cpu).collect();
        fx.op = GatherOpHandle::new(fx.scopes.clone(), places.clone())
            .unwrap()
            .with_config(GatherConfig {
                validate_inputs: false,
            });
        for (i, ctx) in fx.ctxes.iter().enumerate() {
            fx.op
                .set_device_context(places[i], Arc::clone(ctx) as Arc<dyn DeviceContext>);
            fx.op.add_input(VarHandleBase::data(1, i, "input", places[i]));
        }
        fx.op.add_output(VarHandleBase::data(2, 0, "out", places[0]));
        fx
    }

    #[test]
    fn permissive_mode_takes_first_height() {
        let mut fx = permissive_fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(10, vec![0], 2, 0.0, Place::Cpu(0)));
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(12, vec![3], 2, 0.0, Place::Cpu(1)));
        fx.op.run(true).unwrap();
        let out = fx.scopes[0].var("out").selected_rows().unwrap();
        assert_eq!(out.height(), 10);
        assert_eq!(out.rows(), &[0, 3]);
    }

    #[test]
    fn device_without_rows_contributes_nothing() {
        let mut fx = fixture(2);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(10, vec![1, 2], 3, 0.0, Place::Cpu(0)));
        fx.scopes[1]
            .var("input")
            .with_selected_rows_mut(|s| s.set_height(10))
            .unwrap();

        fx.op.run(false).unwrap();
        assert_eq!(fx.ctxes[0].pending(), 1);
        assert_eq!(fx.ctxes[1].pending(), 0);
        fx.ctxes[0].wait().unwrap();

        let out = fx.scopes[0].var("out").selected_rows().unwrap();
        assert_eq!(out.height(), 10);
        assert_eq!(out.rows(), &[1, 2]);
        assert_eq!(out.value().shape().dims(), &[2, 3]);
        assert_eq!(
            out.value().to_vec::<f32>(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn leading_empty_input_does_not_fix_the_row_layout() {
        let mut fx = permissive_fixture(2);
        fx.scopes[0].var("input").set_selected_rows(SelectedRows::default());
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(6, vec![4], 2, 7.0, Place::Cpu(1)));

        fx.op.run(true).unwrap();
        let out = fx.scopes[0].var("out").selected_rows().unwrap();
        assert_eq!(out.height(), 0);
        assert_eq!(out.rows(), &[4]);
        assert_eq!(out.value().shape().dims(), &[1, 2]);
        assert_eq!(out.value().to_vec::<f32>(), vec![7.0, 8.0]);
    }

    #[test]
    fn copies_are_laid_out_by_value_rows() {
        let mut fx = permissive_fixture(2);
        // Two row ids but a single value row.
        let short = DenseTensor::from_vec(Shape::new([1, 2]), vec![1.0f32, 2.0], Place::Cpu(0))
            .unwrap();
        fx.scopes[0]
            .var("input")
            .set_selected_rows(SelectedRows::new(8, vec![0, 1], short));
        fx.scopes[1]
            .var("input")
            .set_selected_rows(selected(8, vec![5], 2, 100.0, Place::Cpu(1)));

        fx.op.run(true).unwrap();
        let out = fx.scopes[0].var("out").selected_rows().unwrap();
        assert_eq!(out.rows(), &[0, 1, 5]);
        assert_eq!(out.value().shape().dims(), &[2, 2]);
        assert_eq!(out.value().to_vec::<f32>(), vec![1.0, 2.0, 100.0, 101.0]);
    }

    #[test]
    fn two_data_outputs_is_a_construction_error() {
        let mut fx = fixture(1);
        fx.scopes[0]
            .var("input")
            .set_selected_rows(selected(4, vec![0], 1, 0.0, Place::Cpu(0)));
        fx.op.add_output(VarHandleBase::data(2, 0, "out2", Place::Cpu(0)));
        let err = fx.op.run(true).unwrap_err();
        assert!(matches!(err, GatherError::Construction { .. }), "{err}");
    }

    #[test]
    fn config_serializes_as_plain_json() {
        let config = GatherConfig {
            validate_inputs: false,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"validate_inputs":false}"#);
        let parsed: GatherConfig = serde_json::from_str(r#"{"validate_inputs":true}"#).unwrap();
        assert!(parsed.validate_inputs);
    }

    #[test]
    fn mismatched_scope_and_place_counts_are_rejected() {
        let root = Scope::new_root();
        let err = GatherOpHandle::new(vec![root.new_child_scope()], Vec::new()).err();
        assert!(matches!(err, Some(GatherError::Construction { .. })));
    }
}
