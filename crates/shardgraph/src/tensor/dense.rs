//! Device-tagged dense tensor backed by a shared byte buffer.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{bail, ensure, Result};

use super::dtype::DType;
use super::element::{decode, encode, Element};
use super::shape::Shape;
use crate::device::Place;

/// Dense tensor whose buffer lives on a particular [`Place`].
///
/// Clones share the same buffer, so work enqueued on a device context can keep writing into a
/// tensor after the enqueuing call returned. Readers must wait on the writing contexts first.
#[derive(Clone)]
pub struct DenseTensor {
    shape: Shape,
    dtype: DType,
    place: Place,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl fmt::Debug for DenseTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseTensor")
            .field("shape", &self.shape.dims())
            .field("dtype", &self.dtype)
            .field("place", &self.place)
            .finish()
    }
}

impl DenseTensor {
    /// Constructs a tensor from typed values, validating the length against the shape.
    pub fn from_vec<T: Element>(shape: Shape, data: Vec<T>, place: Place) -> Result<Self> {
        if data.len() != shape.num_elements() {
            bail!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape.dims()
            );
        }
        Ok(DenseTensor {
            shape,
            dtype: T::DTYPE,
            place,
            buffer: Arc::new(Mutex::new(encode(&data))),
        })
    }

    /// Returns a zero-filled tensor of the requested shape and dtype.
    pub fn zeros(shape: Shape, dtype: DType, place: Place) -> Self {
        let bytes = shape.num_elements() * dtype.size_in_bytes();
        DenseTensor {
            shape,
            dtype,
            place,
            buffer: Arc::new(Mutex::new(vec![0; bytes])),
        }
    }

    /// Returns a zero-row `F32` tensor.
    pub fn empty(place: Place) -> Self {
        Self::zeros(Shape::new([0]), DType::F32, place)
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn place(&self) -> Place {
        self.place
    }

    /// Number of bytes in one leading-axis row.
    pub fn row_bytes(&self) -> usize {
        self.shape.row_elements() * self.dtype.size_in_bytes()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.dtype.size_in_bytes()
    }

    /// Makes `self` alias the buffer, shape, dtype and place of `other`.
    pub fn share_data_with(&mut self, other: &DenseTensor) {
        *self = other.clone();
    }

    /// Reports whether both tensors alias the same buffer.
    pub fn shares_buffer_with(&self, other: &DenseTensor) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Copies the whole of `src` into this tensor starting at leading-axis row `row_offset`.
    ///
    /// The source bytes are snapshotted before the destination is locked, so concurrent copies
    /// from several devices into disjoint row ranges never hold two buffer locks at once.
    pub fn copy_rows_from(&self, row_offset: usize, src: &DenseTensor) -> Result<()> {
        ensure!(
            src.dtype == self.dtype,
            "cannot copy {} rows into a {} tensor",
            src.dtype.name(),
            self.dtype.name()
        );
        ensure!(
            src.shape.feature_dims() == self.shape.feature_dims(),
            "feature shape {:?} does not match destination feature shape {:?}",
            src.shape.feature_dims(),
            self.shape.feature_dims()
        );
        let start = row_offset * self.row_bytes();
        let end = start + src.size_in_bytes();
        let snapshot = {
            let guard = src.buffer.lock().expect("tensor buffer poisoned");
            guard.clone()
        };
        let mut dst = self.buffer.lock().expect("tensor buffer poisoned");
        ensure!(
            end <= dst.len(),
            "row range {}..{} exceeds destination of {} rows",
            row_offset,
            row_offset + src.shape.rows(),
            self.shape.rows()
        );
        dst[start..end].copy_from_slice(&snapshot);
        Ok(())
    }

    /// Reads the buffer back as typed values, panicking if the dtype differs.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        assert_eq!(
            self.dtype,
            T::DTYPE,
            "tensor data is not stored as {}",
            T::DTYPE.name()
        );
        let guard = self.buffer.lock().expect("tensor buffer poisoned");
        decode(&guard)
    }

    /// Overwrites the buffer with typed values of the same length.
    pub fn write<T: Element>(&self, data: &[T]) -> Result<()> {
        ensure!(
            self.dtype == T::DTYPE,
            "cannot write {} values into a {} tensor",
            T::DTYPE.name(),
            self.dtype.name()
        );
        ensure!(
            data.len() == self.len(),
            "tensor data length ({}) does not match shape {:?}",
            data.len(),
            self.shape.dims()
        );
        let mut guard = self.buffer.lock().expect("tensor buffer poisoned");
        *guard = encode(data);
        Ok(())
    }
}
