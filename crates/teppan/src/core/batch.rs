use bytemuck::Pod;
use crate::config::{BatchConfig, ModelMetadata};
use crate::error::{Error, Result};
use crate::memory::{DeviceId, MemoryLocation, MemorySpace};
use crate::stream::StreamProvider;
use crate::tensor::Tensor;
use super::core_trait::{RequestSource, Response, ResponseSink};
use super::gather::InputGatherer;
use super::scatter::OutputScatterer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Open,
    Finalized,
}

/// Counters describing the work a batch performed.
///
/// Reporting them is left to the serving layer, which can read them once
/// [`Batch::finalize`] has returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of requests in the batch
    pub request_count: usize,
    /// Total examples across all requests
    pub batch_size: usize,
    /// Calls to [`Batch::get_input`] that succeeded
    pub inputs_gathered: usize,
    /// Gathered inputs that alias request memory
    pub zero_copy_inputs: usize,
    /// Copies enqueued while gathering inputs
    pub input_copies: usize,
    /// Distinct outputs declared; redeclaring a name does not count twice
    pub outputs_declared: usize,
    /// Copies enqueued while scattering outputs
    pub output_copies: usize,
    /// Whether finalize waited on the stream
    pub synchronized: bool,
}

/// # Batch
///
/// Marshals the tensors of one group of requests to and from the compute
/// stage.
///
/// A batch borrows its requests, stream and model metadata, and owns one
/// response per request. It moves through two states: while open, inputs may
/// be gathered and outputs declared in any order and any number of times;
/// [`Batch::finalize`] then scatters the outputs into the responses and closes
/// the batch for good.
///
/// All copies are enqueued on the borrowed stream, so their ordering relative
/// to compute is purely submission order: inputs gathered before compute is
/// enqueued are visible to it, and outputs are scattered after it. The only
/// point that waits for the stream is the synchronization inside `finalize`,
/// and only when scattering enqueued work.
///
/// `finalize` must be called on every path, errors included, before the
/// batch is dropped.
///
/// # Example
///
/// ```ignore
/// let mut batch = Batch::new(requests, &sink, &stream, &model, BatchConfig::default())?;
///
/// let x = batch.get_input::<f32>("x", MemorySpace::Device, 0)?;
/// let y = batch.get_output::<f32>("y", MemorySpace::Device, 0)?;
/// batch.stream().launch(Box::new(move || run_model(&x, &y)))?;
///
/// batch.finalize().await?;
/// let responses = batch.into_responses()?;
/// ```
pub struct Batch<'a, Q, R, S>
where
    Q: RequestSource + ?Sized,
    S: StreamProvider + ?Sized,
{
    requests: &'a Q,
    responses: Vec<R>,
    stream: &'a S,
    model: &'a ModelMetadata,
    gatherer: InputGatherer,
    scatterer: OutputScatterer,
    state: BatchState,
    stats: BatchStats,
}

impl<'a, Q, R, S> Batch<'a, Q, R, S>
where
    Q: RequestSource + ?Sized,
    R: Response,
    S: StreamProvider + ?Sized,
{
    /// Creates a batch, allocating one response per request.
    ///
    /// If any response cannot be created the whole batch fails; no partially
    /// constructed batch is returned.
    pub fn new<K>(
        requests: &'a Q,
        sink: &K,
        stream: &'a S,
        model: &'a ModelMetadata,
        config: BatchConfig,
    ) -> Result<Self>
    where K: ResponseSink<Response = R>
    {
        let request_count = requests.request_count();
        let responses = (0..request_count)
            .map(|index| {
                sink.create_response(index).map_err(|e| match e {
                    Error::AllocationFailure(_) => e,
                    other => Error::AllocationFailure(format!("response for request {}: {}", index, other)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let batch_size = (0..request_count).map(|index| requests.batch_size(index)).sum();
        tracing::debug!(requests = request_count, batch_size, stream = %stream.id(), "batch created");

        Ok(Self {
            requests,
            responses,
            stream,
            model,
            gatherer: InputGatherer::new(config.pinned_input),
            scatterer: OutputScatterer::new(config.pinned_output),
            state: BatchState::Open,
            stats: BatchStats {
                request_count,
                batch_size,
                ..Default::default()
            },
        })
    }

    /// Gathers input `name` from every request into one tensor in the given
    /// memory space.
    ///
    /// Copies are enqueued on the stream and may still be in flight when this
    /// returns.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_input<T: Pod>(&mut self, name: &str, space: MemorySpace, device: DeviceId) -> Result<Tensor<T>> {
        self.ensure_open("get_input")?;
        let gathered = self.gatherer.gather::<T, _, _>(
            self.requests,
            self.stream,
            name,
            MemoryLocation::new(space, device),
        )?;

        self.stats.inputs_gathered += 1;
        self.stats.input_copies += gathered.copies;
        if gathered.zero_copy {
            self.stats.zero_copy_inputs += 1;
        }
        Ok(gathered.tensor)
    }

    /// Allocates the batch-wide tensor compute writes output `name` into.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_output<T: Pod>(&mut self, name: &str, space: MemorySpace, device: DeviceId) -> Result<Tensor<T>> {
        self.ensure_open("get_output")?;
        let tensor = self.scatterer.declare::<T, _>(
            self.stream,
            self.model,
            name,
            MemoryLocation::new(space, device),
            self.stats.batch_size,
        )?;

        self.stats.outputs_declared = self.scatterer.declared();
        Ok(tensor)
    }

    /// The stream all of this batch's work is ordered on.
    pub fn stream(&self) -> &'a S {
        self.stream
    }

    /// Scatters declared outputs into the responses and waits for the copies
    /// to land.
    ///
    /// If scattering fails after some copies were enqueued, the stream is still
    /// synchronized before the error is returned, so no copy outlives the call.
    /// Calling this a second time is a contract violation and does nothing.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn finalize(&mut self) -> Result<()> {
        self.ensure_open("finalize")?;
        self.state = BatchState::Finalized;

        let scattered = self.scatterer.scatter(
            self.requests,
            &mut self.responses,
            self.stream,
            self.model,
        );
        self.stats.output_copies = self.scatterer.copies();

        if self.scatterer.enqueued() {
            let synchronized = self.stream.synchronize().await;
            self.stats.synchronized = true;
            scattered?;
            synchronized?;
        } else {
            scattered?;
        }

        tracing::debug!(
            requests = self.stats.request_count,
            batch_size = self.stats.batch_size,
            inputs = self.stats.inputs_gathered,
            zero_copy_inputs = self.stats.zero_copy_inputs,
            input_copies = self.stats.input_copies,
            outputs = self.stats.outputs_declared,
            output_copies = self.stats.output_copies,
            synchronized = self.stats.synchronized,
            "batch finalized"
        );
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.state == BatchState::Finalized
    }

    /// Number of requests, which is also the number of responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// The responses, in request order.
    pub fn responses(&self) -> &[R] {
        &self.responses
    }

    /// Hands the responses to the serving layer for delivery.
    ///
    /// Only valid once the batch has been finalized.
    pub fn into_responses(self) -> Result<Vec<R>> {
        if !self.is_finalized() {
            return Err(Error::ContractViolation(
                "responses taken before finalize".to_string(),
            ));
        }
        Ok(self.responses)
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.state {
            BatchState::Open => Ok(()),
            BatchState::Finalized => Err(Error::ContractViolation(format!(
                "{} called on a finalized batch",
                operation
            ))),
        }
    }
}
