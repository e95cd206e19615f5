//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stores the logical dimensions of a tensor.
///
/// Dimensions may be zero, so an empty row set is still a well-formed shape. Serialized as the
/// bare dimension list; deserializing an empty list fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape {
    dims: Vec<usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("shape must have at least one dimension")]
pub struct EmptyShapeError;

impl TryFrom<Vec<usize>> for Shape {
    type Error = EmptyShapeError;

    fn try_from(dims: Vec<usize>) -> Result<Self, Self::Error> {
        if dims.is_empty() {
            return Err(EmptyShapeError);
        }
        Ok(Shape { dims })
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.dims
    }
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every tensor has at least one axis.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape { dims }
    }

    /// Builds `[rows] ++ feature_dims`.
    pub fn with_leading(rows: usize, feature_dims: &[usize]) -> Self {
        let mut dims = Vec::with_capacity(feature_dims.len() + 1);
        dims.push(rows);
        dims.extend_from_slice(feature_dims);
        Shape { dims }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Leading dimension, i.e. the number of rows.
    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    /// Dimensions after the leading one.
    pub fn feature_dims(&self) -> &[usize] {
        &self.dims[1..]
    }

    /// Elements per leading-axis row.
    pub fn row_elements(&self) -> usize {
        self.feature_dims().iter().product()
    }
}
