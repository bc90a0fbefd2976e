use std::fmt;
use std::sync::Arc;
use bytemuck::Pod;
use parking_lot::RwLock;
use crate::error::{Error, Result};
use crate::stream::StreamId;
use super::types::{MemoryLocation, MemorySpace, DeviceId};

/// Backing storage shared by every buffer that views it.
type Region = Arc<RwLock<Vec<u8>>>;

/// # Buffer
///
/// A view of `len` bytes, starting at `offset`, into a shared memory region.
///
/// Buffers are cheap handles: cloning one never copies data (see
/// [`Buffer::duplicate`] for that), it only bumps the reference count on the
/// region. This is what keeps memory alive while copies that reference it are
/// still queued on a stream, and it is also how the zero-copy path hands out an
/// alias of request-owned memory.
///
/// The location of a buffer is fixed at construction. The stream affinity
/// records which stream, if any, owns the ordering of work against it.
#[derive(Clone)]
pub struct Buffer {
    region: Region,
    offset: usize,
    len: usize,
    location: MemoryLocation,
    stream: Option<StreamId>,
}

impl Buffer {
    /// Wraps existing bytes that live in `location`.
    pub fn from_vec(data: Vec<u8>, location: MemoryLocation) -> Self {
        let len = data.len();
        Self {
            region: Arc::new(RwLock::new(data)),
            offset: 0,
            len,
            location,
            stream: None,
        }
    }

    /// Copies typed values into a new region living in `location`.
    pub fn from_slice<T: Pod>(values: &[T], location: MemoryLocation) -> Self {
        Self::from_vec(bytemuck::cast_slice(values).to_vec(), location)
    }

    /// Allocates `len` zeroed bytes in `location`.
    pub fn allocate(len: usize, location: MemoryLocation) -> Self {
        Self::from_vec(vec![0; len], location)
    }

    /// Number of addressable bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    pub fn space(&self) -> MemorySpace {
        self.location.space
    }

    pub fn device(&self) -> DeviceId {
        self.location.device
    }

    /// The stream this buffer's work is ordered on, if any.
    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    pub fn set_stream(&mut self, stream: Option<StreamId>) {
        self.stream = stream;
    }

    pub fn with_stream(mut self, stream: StreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    /// A view of `len` bytes starting `offset` bytes into this buffer.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.len {
            return Err(Error::OutOfBounds { offset, end, len: self.len });
        }
        Ok(Self {
            region: self.region.clone(),
            offset: self.offset + offset,
            len,
            location: self.location,
            stream: self.stream,
        })
    }

    /// Whether both buffers view the same region.
    pub fn aliases(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Whether `next` starts exactly where this buffer ends, in the same region
    /// and location.
    pub fn is_followed_by(&self, next: &Buffer) -> bool {
        self.aliases(next)
            && self.location == next.location
            && self.offset + self.len == next.offset
    }

    /// Joins this buffer with one that directly follows it.
    pub fn merge(&self, next: &Buffer) -> Option<Self> {
        if !self.is_followed_by(next) {
            return None;
        }
        Some(Self {
            region: self.region.clone(),
            offset: self.offset,
            len: self.len + next.len,
            location: self.location,
            stream: self.stream,
        })
    }

    /// Copies the viewed bytes into a fresh region in `location`.
    ///
    /// Unlike `clone`, the result shares nothing with `self`. This copies
    /// immediately; copies that must be ordered with other work go through
    /// [`StreamProvider::enqueue_copy`](crate::stream::StreamProvider::enqueue_copy).
    pub fn duplicate(&self, location: MemoryLocation) -> Self {
        Self::from_vec(self.to_bytes(), location)
    }

    /// Reads the viewed bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.region.read();
        data[self.offset..self.offset + self.len].to_vec()
    }

    /// Reads the viewed bytes as elements of `T`.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        let data = self.region.read();
        bytemuck::pod_collect_to_vec(&data[self.offset..self.offset + self.len])
    }

    /// Overwrites bytes starting `offset` bytes into this buffer.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset.checked_add(bytes.len()).unwrap_or(usize::MAX);
        if end > self.len {
            return Err(Error::OutOfBounds { offset, end, len: self.len });
        }
        let mut data = self.region.write();
        let start = self.offset + offset;
        data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrites the leading elements of this buffer with `values`.
    pub fn write<T: Pod>(&self, values: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(values))
    }

    /// Copies every byte of `src` into this buffer.
    ///
    /// This is the primitive a stream executes for a queued copy; both sides
    /// must have the same length.
    pub fn copy_from(&self, src: &Buffer) -> Result<()> {
        if src.len != self.len {
            return Err(Error::SizeMismatch {
                name: "copy".to_string(),
                expected: self.len,
                found: src.len,
            });
        }
        if self.aliases(src) {
            let mut data = self.region.write();
            data.copy_within(src.offset..src.offset + src.len, self.offset);
            return Ok(());
        }
        // release the source before locking the destination
        let bytes = src.to_bytes();
        self.write_bytes(0, &bytes)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::from_vec(vec![], MemoryLocation::host())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("location", &self.location)
            .field("stream", &self.stream)
            .finish()
    }
}
