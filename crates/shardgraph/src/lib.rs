pub mod device;
mod env;
pub mod error;
pub mod graph;
pub mod scope;
pub mod tensor;

pub use device::{DeviceContext, DeviceWork, Place};
pub use error::{GatherError, GatherResult};
pub use graph::{GatherOpHandle, OpHandle};
pub use scope::Scope;
pub use tensor::{DType, DenseTensor, SelectedRows, Shape};
