use std::fmt;
use std::sync::RwLock;

use crate::error::{GatherError, GatherResult};
use crate::tensor::{DenseTensor, SelectedRows};

/// Kind tag of the value a variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    DenseTensor,
    SelectedRows,
}

impl VarKind {
    pub fn name(self) -> &'static str {
        match self {
            VarKind::DenseTensor => "DenseTensor",
            VarKind::SelectedRows => "SelectedRows",
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type-erased variable payload.
#[derive(Debug, Clone)]
pub enum VarValue {
    DenseTensor(DenseTensor),
    SelectedRows(SelectedRows),
}

impl VarValue {
    pub fn kind(&self) -> VarKind {
        match self {
            VarValue::DenseTensor(_) => VarKind::DenseTensor,
            VarValue::SelectedRows(_) => VarKind::SelectedRows,
        }
    }
}

/// Named slot inside a [`Scope`](super::Scope).
///
/// Starts empty; the kind is fixed by the first mutable access or explicit `set_*` call.
#[derive(Debug)]
pub struct Variable {
    name: String,
    value: RwLock<Option<VarValue>>,
}

fn found_name(value: &Option<VarValue>) -> &'static str {
    match value {
        Some(value) => value.kind().name(),
        None => "nothing",
    }
}

impl Variable {
    pub(super) fn new(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            value: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the held value, or `None` while the variable is still empty.
    pub fn kind(&self) -> Option<VarKind> {
        self.value
            .read()
            .expect("variable lock poisoned")
            .as_ref()
            .map(VarValue::kind)
    }

    pub fn is_initialized(&self) -> bool {
        self.kind().is_some()
    }

    /// Returns the held SelectedRows. The value buffer is shared, the row list is copied.
    pub fn selected_rows(&self) -> GatherResult<SelectedRows> {
        let guard = self.value.read().expect("variable lock poisoned");
        match &*guard {
            Some(VarValue::SelectedRows(selected)) => Ok(selected.clone()),
            other => Err(GatherError::type_mismatch(
                &self.name,
                VarKind::SelectedRows.name(),
                found_name(other),
            )),
        }
    }

    /// Returns the held dense tensor (sharing its buffer).
    pub fn dense_tensor(&self) -> GatherResult<DenseTensor> {
        let guard = self.value.read().expect("variable lock poisoned");
        match &*guard {
            Some(VarValue::DenseTensor(tensor)) => Ok(tensor.clone()),
            other => Err(GatherError::type_mismatch(
                &self.name,
                VarKind::DenseTensor.name(),
                found_name(other),
            )),
        }
    }

    /// Mutates the held SelectedRows, creating an empty one if the variable is empty.
    pub fn with_selected_rows_mut<R>(
        &self,
        f: impl FnOnce(&mut SelectedRows) -> R,
    ) -> GatherResult<R> {
        let mut guard = self.value.write().expect("variable lock poisoned");
        let slot = guard.get_or_insert_with(|| VarValue::SelectedRows(SelectedRows::default()));
        match slot {
            VarValue::SelectedRows(selected) => Ok(f(selected)),
            VarValue::DenseTensor(_) => Err(GatherError::type_mismatch(
                &self.name,
                VarKind::SelectedRows.name(),
                VarKind::DenseTensor.name(),
            )),
        }
    }

    /// Mutates the held dense tensor, creating an empty one if the variable is empty.
    pub fn with_dense_tensor_mut<R>(
        &self,
        f: impl FnOnce(&mut DenseTensor) -> R,
    ) -> GatherResult<R> {
        let mut guard = self.value.write().expect("variable lock poisoned");
        let slot = guard
            .get_or_insert_with(|| VarValue::DenseTensor(DenseTensor::empty(Default::default())));
        match slot {
            VarValue::DenseTensor(tensor) => Ok(f(tensor)),
            VarValue::SelectedRows(_) => Err(GatherError::type_mismatch(
                &self.name,
                VarKind::DenseTensor.name(),
                VarKind::SelectedRows.name(),
            )),
        }
    }

    /// Replaces whatever the variable held.
    pub fn set(&self, value: VarValue) {
        *self.value.write().expect("variable lock poisoned") = Some(value);
    }

    pub fn set_selected_rows(&self, selected: SelectedRows) {
        self.set(VarValue::SelectedRows(selected));
    }

    pub fn set_dense_tensor(&self, tensor: DenseTensor) {
        self.set(VarValue::DenseTensor(tensor));
    }

    /// Drops the held value, returning the variable to the empty state.
    pub fn clear(&self) {
        *self.value.write().expect("variable lock poisoned") = None;
    }
}
