//! # Memory
//!
//! Buffers and the memory spaces they live in.
//!
//! A [`Buffer`] is a reference-counted view into a byte region tagged with a
//! [`MemoryLocation`]. Request inputs, response outputs, staging areas and
//! batch-wide tensors are all buffers; a stream moves bytes between them.

mod buffer;
mod types;

pub use buffer::Buffer;
pub use types::{DeviceId, MemoryLocation, MemorySpace};
