use std::mem::size_of;
use bytemuck::Pod;
use crate::config::ModelMetadata;
use crate::error::{Error, Result};
use crate::memory::{Buffer, MemoryLocation, MemorySpace};
use crate::stream::StreamProvider;
use crate::tensor::Tensor;
use crate::tensor::shape::{element_count, output_shape, request_shape};
use super::core_trait::{RequestSource, Response};

/// A batch-wide output waiting to be scattered.
struct OutputRecord {
    name: String,
    shape: Vec<usize>,
    buffer: Buffer,
    element_size: usize,
}

/// A response destination waiting for a shared pinned transfer.
struct Staged {
    source_offset: usize,
    destination: Buffer,
}

/// Hands each request its slice of every declared output.
///
/// Outputs are declared first, which allocates a batch-wide buffer for
/// compute to write into. Scattering happens once at the end: for every
/// output, each request's sub-range is copied into the buffer its response
/// provides, wherever that buffer lives.
///
/// With pinned output enabled, consecutive pageable host destinations fed
/// from device memory share one device-to-pinned transfer, followed by cheap
/// host copies out of the pinned buffer.
pub(crate) struct OutputScatterer {
    pinned_output: bool,
    outputs: Vec<OutputRecord>,
    copies: usize,
}

impl OutputScatterer {
    pub(crate) fn new(pinned_output: bool) -> Self {
        Self {
            pinned_output,
            outputs: vec![],
            copies: 0,
        }
    }

    /// Copies enqueued by [`OutputScatterer::scatter`] so far
    pub(crate) fn copies(&self) -> usize {
        self.copies
    }

    /// Whether scattering enqueued any asynchronous work
    pub(crate) fn enqueued(&self) -> bool {
        self.copies > 0
    }

    /// Number of outputs currently declared
    pub(crate) fn declared(&self) -> usize {
        self.outputs.len()
    }

    /// Allocates the batch-wide buffer for output `name` and records it.
    ///
    /// Declaring the same name again replaces the earlier buffer.
    pub(crate) fn declare<T, S>(
        &mut self,
        stream: &S,
        model: &ModelMetadata,
        name: &str,
        location: MemoryLocation,
        total_batch_size: usize,
    ) -> Result<Tensor<T>>
    where
        T: Pod,
        S: StreamProvider + ?Sized,
    {
        let shape = output_shape(name, model, total_batch_size)?;
        let buffer = stream.allocate(element_count(&shape) * size_of::<T>(), location)?;
        if buffer.location() != location {
            return Err(Error::UnexpectedDataLocation {
                name: name.to_string(),
                expected: location,
                found: buffer.location(),
            });
        }
        let tensor = Tensor::new(shape.clone(), buffer.clone())?;

        let record = OutputRecord {
            name: name.to_string(),
            shape,
            buffer,
            element_size: size_of::<T>(),
        };
        match self.outputs.iter_mut().find(|r| r.name == name) {
            Some(existing) => {
                tracing::warn!(output = name, "output declared again, replacing earlier buffer");
                *existing = record;
            }
            None => self.outputs.push(record),
        }
        Ok(tensor)
    }

    /// Enqueues copies from every declared output into the responses.
    ///
    /// Responses are matched to requests by index. Returns whether any work
    /// was enqueued; if so the stream must be synchronized before the
    /// responses can be read.
    pub(crate) fn scatter<Q, R, S>(
        &mut self,
        requests: &Q,
        responses: &mut [R],
        stream: &S,
        model: &ModelMetadata,
    ) -> Result<bool>
    where
        Q: RequestSource + ?Sized,
        R: Response,
        S: StreamProvider + ?Sized,
    {
        for index in 0..self.outputs.len() {
            let copies = self.scatter_output(index, requests, responses, stream, model)?;
            tracing::debug!(output = %self.outputs[index].name, copies, "scattered output");
        }
        Ok(self.enqueued())
    }

    fn scatter_output<Q, R, S>(
        &mut self,
        index: usize,
        requests: &Q,
        responses: &mut [R],
        stream: &S,
        model: &ModelMetadata,
    ) -> Result<usize>
    where
        Q: RequestSource + ?Sized,
        R: Response,
        S: StreamProvider + ?Sized,
    {
        let record = &self.outputs[index];
        let source = record.buffer.clone();
        let name = record.name.clone();
        let batch_shape = record.shape.clone();
        let element_size = record.element_size;

        let stage = self.pinned_output
            && model.is_batching()
            && source.space() == MemorySpace::Device;
        let mut staged: Vec<Staged> = vec![];
        let mut offset = 0;
        let copies_before = self.copies;

        for (request_index, response) in responses.iter_mut().enumerate() {
            let shape = request_shape(&batch_shape, requests.batch_size(request_index), model);
            let byte_len = element_count(&shape) * element_size;
            let slice = source.slice(offset, byte_len)?;

            match response.output_buffer(&name, &shape, byte_len, source.location())? {
                None => self.flush_staged(stream, &source, &mut staged)?,
                Some(destination) => {
                    if destination.len() != byte_len {
                        return Err(Error::SizeMismatch {
                            name: format!("{} (request {})", name, request_index),
                            expected: byte_len,
                            found: destination.len(),
                        });
                    }
                    if stage && destination.space() == MemorySpace::Host {
                        staged.push(Staged { source_offset: offset, destination });
                    } else {
                        self.flush_staged(stream, &source, &mut staged)?;
                        self.copy(stream, &slice, &destination)?;
                    }
                }
            }

            if model.is_batching() {
                offset += byte_len;
            }
        }
        self.flush_staged(stream, &source, &mut staged)?;

        Ok(self.copies - copies_before)
    }

    /// Moves pending host destinations out of `source`.
    ///
    /// Pending destinations always cover one contiguous range of the source,
    /// so several of them share a single transfer into pinned memory.
    fn flush_staged<S>(&mut self, stream: &S, source: &Buffer, staged: &mut Vec<Staged>) -> Result<()>
    where S: StreamProvider + ?Sized
    {
        let pending = std::mem::take(staged);
        match pending.as_slice() {
            [] => Ok(()),
            [single] => {
                let slice = source.slice(single.source_offset, single.destination.len())?;
                self.copy(stream, &slice, &single.destination)
            }
            pending => {
                let start = pending[0].source_offset;
                let total = pending.iter().map(|s| s.destination.len()).sum();
                let pinned = stream.allocate(total, MemoryLocation::pinned())?;
                self.copy(stream, &source.slice(start, total)?, &pinned)?;
                for staged in pending {
                    let slice = pinned.slice(staged.source_offset - start, staged.destination.len())?;
                    self.copy(stream, &slice, &staged.destination)?;
                }
                tracing::trace!(responses = pending.len(), bytes = total, "staged output through pinned memory");
                Ok(())
            }
        }
    }

    fn copy<S>(&mut self, stream: &S, source: &Buffer, destination: &Buffer) -> Result<()>
    where S: StreamProvider + ?Sized
    {
        stream.enqueue_copy(source, destination)?;
        self.copies += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::{MockRequest, MockResponse};
    use crate::stream::HostStream;

    const SPACES: [MemoryLocation; 3] = [
        MemoryLocation { space: MemorySpace::Host, device: 0 },
        MemoryLocation { space: MemorySpace::PinnedHost, device: 0 },
        MemoryLocation { space: MemorySpace::Device, device: 0 },
    ];

    fn requests(batch_sizes: &[usize]) -> Vec<MockRequest> {
        batch_sizes.iter().map(|b| MockRequest::new(*b)).collect()
    }

    fn responses(count: usize, location: MemoryLocation) -> Vec<MockResponse> {
        (0..count).map(|_| MockResponse::default().wanting("y", location)).collect()
    }

    #[tokio::test]
    async fn test_scatter_every_space_pairing() {
        let model = ModelMetadata::new(8).with_output("y", vec![2]);
        let requests = requests(&[2, 1, 3]);

        for pinned_output in [false, true] {
            for source_location in SPACES {
                for destination_location in SPACES {
                    let stream = HostStream::new(1);
                    let mut scatterer = OutputScatterer::new(pinned_output);
                    let output = scatterer
                        .declare::<f32, _>(&stream, &model, "y", source_location, 6)
                        .unwrap();
                    let values = (0..12).map(|v| v as f32).collect::<Vec<_>>();
                    output.write(&values).unwrap();

                    let mut responses = responses(3, destination_location);
                    let enqueued = scatterer
                        .scatter(requests.as_slice(), &mut responses, &stream, &model)
                        .unwrap();
                    assert!(enqueued);
                    stream.synchronize().await.unwrap();

                    let mut offset = 0;
                    for (index, response) in responses.iter().enumerate() {
                        let buffer = response.output("y").unwrap();
                        let len = requests.as_slice().batch_size(index) * 2;
                        assert_eq!(buffer.location(), destination_location);
                        assert_eq!(buffer.to_vec::<f32>(), values[offset..offset + len].to_vec(),
                                   "{} -> {} (pinned {})", source_location, destination_location, pinned_output);
                        offset += len;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_pinned_output_shares_one_device_transfer() {
        let model = ModelMetadata::new(8).with_output("y", vec![2]);
        let requests = requests(&[2, 1, 3]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(true);
        scatterer
            .declare::<u8, _>(&stream, &model, "y", MemoryLocation::device(0), 6)
            .unwrap();

        let mut responses = responses(3, MemoryLocation::host());
        scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();

        // one device-to-pinned transfer plus one host copy per response
        assert_eq!(scatterer.copies(), 4);
    }

    #[tokio::test]
    async fn test_unrequested_outputs_are_skipped() {
        let model = ModelMetadata::new(8).with_output("y", vec![1]);
        let requests = requests(&[1, 1, 1]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(false);
        let output = scatterer
            .declare::<i32, _>(&stream, &model, "y", MemoryLocation::host(), 3)
            .unwrap();
        output.write(&[10, 20, 30]).unwrap();

        let mut responses = vec![
            MockResponse::default().wanting("y", MemoryLocation::host()),
            MockResponse::default(),
            MockResponse::default().wanting("y", MemoryLocation::host()),
        ];
        scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();
        stream.synchronize().await.unwrap();

        assert_eq!(scatterer.copies(), 2);
        assert_eq!(responses[0].output("y").unwrap().to_vec::<i32>(), vec![10]);
        assert!(responses[1].output("y").is_none());
        assert_eq!(responses[2].output("y").unwrap().to_vec::<i32>(), vec![30]);
    }

    #[tokio::test]
    async fn test_nothing_declared_enqueues_nothing() {
        let model = ModelMetadata::new(8);
        let requests = requests(&[1]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(true);
        let mut responses = responses(1, MemoryLocation::host());

        let enqueued = scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();
        assert!(!enqueued);
        assert_eq!(stream.copies_enqueued(), 0);
    }

    #[tokio::test]
    async fn test_redeclare_replaces_output() {
        let model = ModelMetadata::new(8).with_output("y", vec![1]);
        let requests = requests(&[1]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(false);
        let first = scatterer.declare::<u8, _>(&stream, &model, "y", MemoryLocation::host(), 1).unwrap();
        first.write(&[1]).unwrap();
        let second = scatterer.declare::<u8, _>(&stream, &model, "y", MemoryLocation::host(), 1).unwrap();
        second.write(&[2]).unwrap();
        assert_eq!(scatterer.declared(), 1);

        let mut responses = responses(1, MemoryLocation::host());
        scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();
        stream.synchronize().await.unwrap();

        assert_eq!(scatterer.copies(), 1);
        assert_eq!(responses[0].output("y").unwrap().to_vec::<u8>(), vec![2]);
    }

    #[tokio::test]
    async fn test_non_batching_model_sends_whole_output() {
        let model = ModelMetadata::new(0).with_output("y", vec![2, 2]);
        let requests = requests(&[1]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(false);
        let output = scatterer
            .declare::<u16, _>(&stream, &model, "y", MemoryLocation::device(0), 1)
            .unwrap();
        assert_eq!(output.shape(), &[2, 2]);
        output.write(&[1, 2, 3, 4]).unwrap();

        let mut responses = responses(1, MemoryLocation::pinned());
        scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();
        stream.synchronize().await.unwrap();

        assert_eq!(responses[0].output_shape("y").unwrap(), &[2, 2]);
        assert_eq!(responses[0].output("y").unwrap().to_vec::<u16>(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_scalar_output_reaches_every_request() {
        let model = ModelMetadata::new(0).with_output("score", vec![]);
        let requests = requests(&[1, 1]);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(true);
        let output = scatterer
            .declare::<f32, _>(&stream, &model, "score", MemoryLocation::device(0), 2)
            .unwrap();
        assert_eq!(output.buffer().len(), 4);
        output.write(&[0.5]).unwrap();

        let mut responses = (0..2).map(|_| MockResponse::default().wanting("score", MemoryLocation::host())).collect::<Vec<_>>();
        scatterer.scatter(requests.as_slice(), &mut responses, &stream, &model).unwrap();
        stream.synchronize().await.unwrap();

        for response in &responses {
            assert_eq!(response.output_shape("score").unwrap(), &[] as &[usize]);
            assert_eq!(response.output("score").unwrap().to_vec::<f32>(), vec![0.5]);
        }
    }

    #[tokio::test]
    async fn test_declare_unknown_output() {
        let model = ModelMetadata::new(8);
        let stream = HostStream::new(1);
        let mut scatterer = OutputScatterer::new(false);
        assert!(matches!(
            scatterer.declare::<u8, _>(&stream, &model, "nope", MemoryLocation::host(), 1),
            Err(Error::UnknownOutput(_))
        ));
        assert_eq!(scatterer.declared(), 0);
    }

    #[tokio::test]
    async fn test_declare_on_missing_device() {
        let model = ModelMetadata::new(8).with_output("y", vec![1]);
        let stream = HostStream::new(0);
        let mut scatterer = OutputScatterer::new(false);
        assert!(matches!(
            scatterer.declare::<u8, _>(&stream, &model, "y", MemoryLocation::device(0), 1),
            Err(Error::AllocationFailure(_))
        ));
    }
}
