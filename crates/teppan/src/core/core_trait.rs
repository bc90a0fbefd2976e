use crate::error::Result;
use crate::memory::{Buffer, MemoryLocation};

/// One request's data for a named input.
///
/// The data may be split across several buffers, each living wherever the
/// serving layer put it. Concatenated in order they hold `shape`.
#[derive(Debug, Clone)]
pub struct InputDescriptor {
    pub shape: Vec<usize>,
    pub buffers: Vec<Buffer>,
}

impl InputDescriptor {
    pub fn new(shape: Vec<usize>, buffers: Vec<Buffer>) -> Self {
        Self { shape, buffers }
    }

    /// Total bytes across all buffers
    pub fn byte_len(&self) -> usize {
        self.buffers.iter().map(Buffer::len).sum()
    }
}

/// The requests making up a batch, as seen by the marshalling layer.
///
/// Requests are addressed by index; the index of a request is also the index
/// of its response.
pub trait RequestSource {
    /// Number of requests in the batch
    fn request_count(&self) -> usize;

    /// The data request `index` supplies for input `name`, if any.
    fn input(&self, index: usize, name: &str) -> Option<InputDescriptor>;

    /// Number of examples request `index` contributes along the batch dimension.
    fn batch_size(&self, index: usize) -> usize;
}

/// A response under construction for one request.
pub trait Response {
    /// The buffer output `name` of this response should be written to.
    ///
    /// `shape` and `byte_len` describe this request's slice of the output and
    /// `preferred` is where the batch-wide output currently lives. The response
    /// may place its buffer anywhere; the scatterer honors whatever location
    /// it gets back. Returns `None` when the request did not ask for `name`.
    fn output_buffer(
        &mut self,
        name: &str,
        shape: &[usize],
        byte_len: usize,
        preferred: MemoryLocation,
    ) -> Result<Option<Buffer>>;
}

/// Creates the response slot for each request of a batch.
pub trait ResponseSink {
    type Response: Response;

    /// Allocates the response for request `index`.
    fn create_response(&self, index: usize) -> Result<Self::Response>;
}
