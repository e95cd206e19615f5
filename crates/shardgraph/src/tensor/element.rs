//! Defines the scalar element trait used to move typed data in and out of byte buffers.

use super::dtype::DType;

/// Scalar type that can be stored in a [`DenseTensor`](super::DenseTensor).
///
/// Buffers are kept as native-endian bytes so device copies stay dtype-agnostic.
pub trait Element: Copy + Default + Send + Sync + 'static {
    /// The dtype tag recorded on tensors holding this element type.
    const DTYPE: DType;

    /// Appends the native-endian encoding of `self` to `out`.
    fn write_ne(self, out: &mut Vec<u8>);

    /// Decodes one element from exactly `size_in_bytes` native-endian bytes.
    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn write_ne(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }
        }
    };
}

impl_element!(f32, DType::F32);
impl_element!(f64, DType::F64);
impl_element!(i32, DType::I32);
impl_element!(i64, DType::I64);

/// Encodes a typed vector into a byte buffer.
pub(crate) fn encode<T: Element>(data: &[T]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * T::DTYPE.size_in_bytes());
    for value in data {
        value.write_ne(&mut bytes);
    }
    bytes
}

/// Decodes a byte buffer into typed values, asserting that the layout matches.
pub(crate) fn decode<T: Element>(bytes: &[u8]) -> Vec<T> {
    let width = T::DTYPE.size_in_bytes();
    assert_eq!(
        bytes.len() % width,
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        width
    );
    bytes.chunks_exact(width).map(T::read_ne).collect()
}
