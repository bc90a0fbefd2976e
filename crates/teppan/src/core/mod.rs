//! # Core Batch Marshalling
//!
//! The core module moves tensors between the requests of a batch and the
//! compute stage that runs on it.
//!
//! ## Module Structure
//!
//! * [`batch`] - The [`Batch`] orchestrator. Owns the responses for a group of
//!   requests, gathers inputs, allocates outputs and finalizes the batch by
//!   scattering outputs back into the responses.
//!
//! * `core_trait` - The seams to the serving layer: [`RequestSource`] exposes
//!   request inputs, [`ResponseSink`] creates one [`Response`] per request, and
//!   a response hands out the buffers its outputs are written to.
//!
//! * `gather` / `scatter` - The copy planning behind [`Batch::get_input`] and
//!   [`Batch::finalize`]. Both enqueue every copy on the batch stream, coalesce
//!   neighbouring buffers and optionally stage pageable host memory through a
//!   pinned buffer.
//!
pub mod batch;
mod core_trait;
pub(crate) mod gather;
pub(crate) mod scatter;

#[cfg(test)]
pub(crate) mod mock;

pub use batch::{Batch, BatchStats};
pub use core_trait::{InputDescriptor, RequestSource, Response, ResponseSink};
