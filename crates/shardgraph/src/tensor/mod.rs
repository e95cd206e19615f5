//! Tensor values stored in scope variables.
//!
//! A [`DenseTensor`] is a device-tagged buffer with a shape and dtype; a [`SelectedRows`] pairs
//! one with host-side row ids and a logical height to describe a sparse matrix.

mod dense;
pub mod dtype;
pub mod element;
mod selected_rows;
pub mod shape;

pub use dense::DenseTensor;
pub use dtype::DType;
pub use element::Element;
pub use selected_rows::SelectedRows;
pub use shape::Shape;
