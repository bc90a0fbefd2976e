//! # Streams
//!
//! A stream is an ordered, non-blocking command queue. Copies and compute
//! enqueued on the same stream execute in submission order, which is the only
//! ordering mechanism a batch relies on: gather copies happen-before compute,
//! and compute happens-before scatter copies, because they were submitted in
//! that order.
//!
//! The [`StreamProvider`] trait is the seam between the batching core and
//! whatever owns the real device. [`HostStream`] is a host-memory
//! implementation backed by a background tokio task.

mod fence;
mod host;
mod worker;

use async_trait::async_trait;
use uuid::Uuid;
use crate::error::Result;
use crate::memory::{Buffer, MemoryLocation};

pub use fence::Fence;
pub use host::HostStream;

/// Identity of a stream, recorded as the affinity of buffers allocated on it.
pub type StreamId = Uuid;

/// Work that runs on the stream, in order with queued copies.
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Capabilities a batch needs from the stream it is borrowed.
///
/// Implementations must execute enqueued work strictly in submission order.
/// None of the enqueue methods may block on completion; only
/// [`StreamProvider::synchronize`] waits.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Identity of this stream
    fn id(&self) -> StreamId;

    /// Allocates `len` bytes in `location`, with affinity to this stream.
    ///
    /// The returned buffer should live in the requested location; callers
    /// verify this and treat a mismatch as fatal.
    fn allocate(&self, len: usize, location: MemoryLocation) -> Result<Buffer>;

    /// Enqueues a copy of all of `src` into `dst`.
    fn enqueue_copy(&self, src: &Buffer, dst: &Buffer) -> Result<()>;

    /// Enqueues a host function, ordered with the copies around it.
    fn launch(&self, task: HostTask) -> Result<()>;

    /// Waits until everything enqueued so far has executed.
    async fn synchronize(&self) -> Result<()>;
}
