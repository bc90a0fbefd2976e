//! # Tensors
//!
//! A [`Tensor`] pairs a shape with the [`Buffer`] holding its elements. The
//! shape is fixed at construction and always agrees with the buffer's length.
//!
//! The element type only matters for sizing and for typed reads and writes;
//! the bytes themselves live wherever the buffer lives. Reading or writing a
//! tensor directly touches its memory immediately, so callers must make sure
//! work queued against it on the stream has completed first (or do the access
//! from a task launched on that stream).

pub mod constant;
pub mod shape;

use std::fmt;
use std::marker::PhantomData;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::memory::{Buffer, MemoryLocation};

pub struct Tensor<T> {
    shape: Vec<usize>,
    buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> Tensor<T> {
    /// Wraps `buffer` as a tensor of `shape`.
    ///
    /// Fails if the buffer does not hold exactly the bytes the shape needs.
    pub fn new(shape: Vec<usize>, buffer: Buffer) -> Result<Self> {
        let expected = shape::element_count(&shape) * size_of::<T>();
        if expected != buffer.len() {
            return Err(Error::SizeMismatch {
                name: format!("tensor {:?}", shape),
                expected,
                found: buffer.len(),
            });
        }
        Ok(Self {
            shape,
            buffer,
            _marker: PhantomData,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    pub fn location(&self) -> MemoryLocation {
        self.buffer.location()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        shape::element_count(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every element.
    pub fn to_vec(&self) -> Vec<T> {
        self.buffer.to_vec()
    }

    /// Overwrites every element with `values`.
    pub fn write(&self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::SizeMismatch {
                name: format!("tensor {:?}", self.shape),
                expected: self.buffer.len(),
                found: std::mem::size_of_val(values),
            });
        }
        self.buffer.write(values)
    }
}

#[cfg(feature = "candle")]
impl<T> Tensor<T>
where T: Pod + candle_core::WithDType
{
    /// Builds a CPU candle tensor holding a copy of this tensor's elements.
    pub fn to_candle(&self) -> Result<candle_core::Tensor> {
        Ok(candle_core::Tensor::from_vec(
            self.to_vec(),
            self.shape.clone(),
            &candle_core::Device::Cpu,
        )?)
    }

    /// Overwrites this tensor with the elements of a candle tensor of the same
    /// element count.
    pub fn copy_from_candle(&self, tensor: &candle_core::Tensor) -> Result<()> {
        let values = tensor.flatten_all()?.to_vec1::<T>()?;
        self.write(&values)
    }
}

#[cfg(feature = "burn")]
impl<T> Tensor<T>
where T: Pod + burn::tensor::Element
{
    /// Copies this tensor's elements into burn tensor data of the same shape.
    pub fn to_burn_data(&self) -> burn::tensor::TensorData {
        burn::tensor::TensorData::new(self.to_vec(), self.shape.clone())
    }
}

impl<T> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            buffer: self.buffer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_buffer() {
        let buffer = Buffer::allocate(6 * size_of::<f32>(), MemoryLocation::host());
        let tensor = Tensor::<f32>::new(vec![2, 3], buffer.clone()).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.len(), 6);

        assert!(matches!(
            Tensor::<f32>::new(vec![2, 2], buffer),
            Err(Error::SizeMismatch { expected: 16, found: 24, .. })
        ));
    }

    #[test]
    fn test_scalar_tensor() {
        let tensor = Tensor::<f32>::new(vec![], Buffer::allocate(4, MemoryLocation::host())).unwrap();
        assert_eq!(tensor.len(), 1);
        tensor.write(&[42.]).unwrap();
        assert_eq!(tensor.to_vec(), vec![42.]);

        assert!(Tensor::<f32>::new(vec![], Buffer::default()).is_err());
    }

    #[test]
    fn test_zero_batch_holds_nothing() {
        let tensor = Tensor::<u8>::new(vec![0, 3], Buffer::default()).unwrap();
        assert!(tensor.is_empty());
        assert!(tensor.to_vec().is_empty());
    }

    #[test]
    fn test_write_and_read() {
        let tensor = Tensor::<i64>::new(vec![3], Buffer::allocate(24, MemoryLocation::pinned())).unwrap();
        tensor.write(&[4, 5, 6]).unwrap();
        assert_eq!(tensor.to_vec(), vec![4, 5, 6]);
        assert!(tensor.write(&[1, 2]).is_err());
    }

    #[test]
    fn test_clone_shares_memory() {
        let tensor = Tensor::<u16>::new(vec![2], Buffer::allocate(4, MemoryLocation::host())).unwrap();
        let other = tensor.clone();
        other.write(&[1, 2]).unwrap();
        assert_eq!(tensor.to_vec(), vec![1, 2]);
    }

    #[cfg(feature = "candle")]
    #[test]
    fn test_candle_round_trip() {
        let tensor = Tensor::<f32>::new(vec![2, 2], Buffer::from_slice(&[1f32, 2., 3., 4.], MemoryLocation::host())).unwrap();
        let candle = tensor.to_candle().unwrap();
        assert_eq!(candle.dims(), &[2, 2]);

        let doubled = (candle * 2.0).unwrap();
        tensor.copy_from_candle(&doubled).unwrap();
        assert_eq!(tensor.to_vec(), vec![2., 4., 6., 8.]);
    }

    #[cfg(feature = "burn")]
    #[test]
    fn test_burn_data() {
        let tensor = Tensor::<f32>::new(vec![1, 2], Buffer::from_slice(&[1f32, 2.], MemoryLocation::host())).unwrap();
        let data = tensor.to_burn_data();
        assert_eq!(data.shape, vec![1, 2]);
    }
}
