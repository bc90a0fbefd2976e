use std::collections::HashMap;
use async_trait::async_trait;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::memory::{Buffer, MemoryLocation};
use crate::stream::{HostStream, HostTask, StreamId, StreamProvider};
use super::core_trait::{InputDescriptor, RequestSource, Response, ResponseSink};

// A simple request double holding its inputs in memory
#[derive(Debug, Clone)]
pub struct MockRequest {
    batch_size: usize,
    inputs: HashMap<String, InputDescriptor>,
}

impl MockRequest {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size, inputs: HashMap::new() }
    }

    pub fn with_input(mut self, name: &str, shape: Vec<usize>, buffers: Vec<Buffer>) -> Self {
        self.inputs.insert(name.to_string(), InputDescriptor::new(shape, buffers));
        self
    }

    /// Single-buffer input whose batch size is the leading dimension of `shape`.
    pub fn with_values<T: Pod>(self, name: &str, shape: Vec<usize>, values: &[T], location: MemoryLocation) -> Self {
        self.with_input(name, shape, vec![Buffer::from_slice(values, location)])
    }
}

impl RequestSource for [MockRequest] {
    fn request_count(&self) -> usize {
        self.len()
    }

    fn input(&self, index: usize, name: &str) -> Option<InputDescriptor> {
        self.get(index)?.inputs.get(name).cloned()
    }

    fn batch_size(&self, index: usize) -> usize {
        self.get(index).map(|r| r.batch_size).unwrap_or(0)
    }
}

// Response double that allocates requested outputs where it was told to
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    wanted: HashMap<String, MemoryLocation>,
    outputs: HashMap<String, Buffer>,
    shapes: HashMap<String, Vec<usize>>,
}

impl MockResponse {
    pub fn wanting(mut self, name: &str, location: MemoryLocation) -> Self {
        self.wanted.insert(name.to_string(), location);
        self
    }

    pub fn output(&self, name: &str) -> Option<&Buffer> {
        self.outputs.get(name)
    }

    pub fn output_shape(&self, name: &str) -> Option<&[usize]> {
        self.shapes.get(name).map(|s| s.as_slice())
    }
}

impl Response for MockResponse {
    fn output_buffer(
        &mut self,
        name: &str,
        shape: &[usize],
        byte_len: usize,
        _preferred: MemoryLocation,
    ) -> Result<Option<Buffer>> {
        let Some(location) = self.wanted.get(name) else {
            return Ok(None);
        };
        let buffer = Buffer::allocate(byte_len, *location);
        self.outputs.insert(name.to_string(), buffer.clone());
        self.shapes.insert(name.to_string(), shape.to_vec());
        Ok(Some(buffer))
    }
}

// Hands out copies of a template response, optionally failing for one index
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    template: MockResponse,
    fail_at: Option<usize>,
}

impl MockSink {
    pub fn new(template: MockResponse) -> Self {
        Self { template, fail_at: None }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl ResponseSink for MockSink {
    type Response = MockResponse;

    fn create_response(&self, index: usize) -> Result<MockResponse> {
        if self.fail_at == Some(index) {
            return Err(Error::AllocationFailure(format!("no memory for response {}", index)));
        }
        Ok(self.template.clone())
    }
}

// Stream that ignores the requested location and always allocates pageable host memory
pub struct MisplacingStream {
    pub inner: HostStream,
}

#[async_trait]
impl StreamProvider for MisplacingStream {
    fn id(&self) -> StreamId {
        self.inner.id()
    }

    fn allocate(&self, len: usize, _location: MemoryLocation) -> Result<Buffer> {
        self.inner.allocate(len, MemoryLocation::host())
    }

    fn enqueue_copy(&self, src: &Buffer, dst: &Buffer) -> Result<()> {
        self.inner.enqueue_copy(src, dst)
    }

    fn launch(&self, task: HostTask) -> Result<()> {
        self.inner.launch(task)
    }

    async fn synchronize(&self) -> Result<()> {
        self.inner.synchronize().await
    }
}
