use std::mem::size_of;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::memory::{Buffer, MemoryLocation, MemorySpace};
use crate::stream::StreamProvider;
use crate::tensor::Tensor;
use crate::tensor::shape::{element_count, input_shape};
use super::core_trait::RequestSource;

/// The result of gathering one input.
pub(crate) struct Gathered<T> {
    pub(crate) tensor: Tensor<T>,
    /// Copies enqueued on the stream, staging included
    pub(crate) copies: usize,
    /// Whether the tensor aliases request memory
    pub(crate) zero_copy: bool,
}

/// Collects a named input from every request into one batch-wide buffer.
///
/// When all request shards already sit back to back in the requested
/// location, the batch tensor is an alias of that memory and nothing is
/// copied. Otherwise a destination is allocated and shards are copied into
/// it, one copy per contiguous run of shards, ordered on the batch stream.
///
/// With pinned input enabled, runs of pageable host memory bound for a device
/// are first packed into a pinned staging buffer, which then moves to the
/// device in a single transfer.
pub(crate) struct InputGatherer {
    pinned_input: bool,
}

impl InputGatherer {
    pub(crate) fn new(pinned_input: bool) -> Self {
        Self { pinned_input }
    }

    pub(crate) fn gather<T, Q, S>(
        &self,
        requests: &Q,
        stream: &S,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Gathered<T>>
    where
        T: Pod,
        Q: RequestSource + ?Sized,
        S: StreamProvider + ?Sized,
    {
        let descriptors = (0..requests.request_count())
            .map(|request_index| {
                requests.input(request_index, name).ok_or_else(|| Error::MissingInput {
                    name: name.to_string(),
                    request_index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let shapes = descriptors.iter().map(|d| d.shape.clone()).collect::<Vec<_>>();
        let shape = input_shape(name, &shapes)?;

        for (request_index, descriptor) in descriptors.iter().enumerate() {
            let expected = element_count(&descriptor.shape) * size_of::<T>();
            if descriptor.byte_len() != expected {
                return Err(Error::SizeMismatch {
                    name: format!("{} (request {})", name, request_index),
                    expected,
                    found: descriptor.byte_len(),
                });
            }
        }

        let shards = descriptors
            .into_iter()
            .flat_map(|d| d.buffers)
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>();
        let size_bytes = element_count(&shape) * size_of::<T>();

        let (buffer, copies, zero_copy) = if shards.is_empty() {
            (stream.allocate(size_bytes, location)?, 0, false)
        } else if let Some(alias) = contiguous_alias(&shards, location) {
            tracing::debug!(input = name, bytes = size_bytes, %location, "gathered without copy");
            (alias.with_stream(stream.id()), 0, true)
        } else {
            let destination = stream.allocate(size_bytes, location)?;
            let copies = self.copy_shards(stream, &shards, &destination)?;
            tracing::debug!(input = name, bytes = size_bytes, copies, %location, "gathered by copy");
            (destination, copies, false)
        };

        if buffer.location() != location {
            return Err(Error::UnexpectedDataLocation {
                name: name.to_string(),
                expected: location,
                found: buffer.location(),
            });
        }

        Ok(Gathered {
            tensor: Tensor::new(shape, buffer)?,
            copies,
            zero_copy,
        })
    }

    fn copy_shards<S>(&self, stream: &S, shards: &[Buffer], destination: &Buffer) -> Result<usize>
    where S: StreamProvider + ?Sized
    {
        let stage = self.pinned_input && destination.space() == MemorySpace::Device;
        let mut copies = 0;
        let mut offset = 0;
        let mut staged: Vec<Buffer> = vec![];
        let mut staged_offset = 0;

        for run in coalesce(shards) {
            if stage && run.space() == MemorySpace::Host {
                if staged.is_empty() {
                    staged_offset = offset;
                }
                offset += run.len();
                staged.push(run);
                continue;
            }
            copies += flush_staged(stream, &mut staged, destination, staged_offset)?;
            stream.enqueue_copy(&run, &destination.slice(offset, run.len())?)?;
            copies += 1;
            offset += run.len();
        }
        copies += flush_staged(stream, &mut staged, destination, staged_offset)?;

        Ok(copies)
    }
}

/// One buffer spanning every shard, if they are all in `location` and
/// directly follow each other.
fn contiguous_alias(shards: &[Buffer], location: MemoryLocation) -> Option<Buffer> {
    let (first, rest) = shards.split_first()?;
    if first.location() != location {
        return None;
    }
    rest.iter().try_fold(first.clone(), |span, next| span.merge(next))
}

/// Merges neighbouring shards that directly follow each other.
fn coalesce(shards: &[Buffer]) -> Vec<Buffer> {
    let mut runs: Vec<Buffer> = Vec::with_capacity(shards.len());
    for shard in shards {
        let merged = runs.last().and_then(|last| last.merge(shard));
        match merged {
            Some(merged) => {
                if let Some(last) = runs.last_mut() {
                    *last = merged;
                }
            }
            None => runs.push(shard.clone()),
        }
    }
    runs
}

/// Moves pending pageable runs to `destination[offset..]`.
///
/// A single run is copied directly; several are packed into one pinned buffer
/// first so the transfer to the device happens once.
fn flush_staged<S>(stream: &S, staged: &mut Vec<Buffer>, destination: &Buffer, offset: usize) -> Result<usize>
where S: StreamProvider + ?Sized
{
    let runs = std::mem::take(staged);
    match runs.as_slice() {
        [] => Ok(0),
        [run] => {
            stream.enqueue_copy(run, &destination.slice(offset, run.len())?)?;
            Ok(1)
        }
        runs => {
            let total = runs.iter().map(Buffer::len).sum();
            let pinned = stream.allocate(total, MemoryLocation::pinned())?;
            let mut cursor = 0;
            for run in runs {
                stream.enqueue_copy(run, &pinned.slice(cursor, run.len())?)?;
                cursor += run.len();
            }
            stream.enqueue_copy(&pinned, &destination.slice(offset, total)?)?;
            tracing::trace!(runs = runs.len(), bytes = total, "staged input through pinned memory");
            Ok(runs.len() + 1)
        }
    }
}
