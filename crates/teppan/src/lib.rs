//! # Teppan
//!
//! Batched tensor I/O marshalling for inference backends.
//!
//! ## Overview
//!
//! A serving layer hands an inference backend a group of requests, each
//! carrying its own inputs in its own memory, possibly split across several
//! buffers and possibly on a different device than the model. Teppan turns
//! those into the contiguous batch-wide tensors a model runs on, and after
//! compute hands every request its slice of every output, in the memory its
//! response asked for.
//!
//! Key components include:
//!
//! - [`Buffer`] - reference-counted memory tagged with a space and device
//! - [`Tensor`] - a typed, shaped view over a buffer
//! - [`Batch`] - gathers inputs, allocates outputs and scatters results
//! - [`StreamProvider`] - the ordered command queue all copies go through
//!
//! ## Architecture
//!
//! ### Assumptions
//! Regardless of backend used, teppan reserves one dimension with special meaning:
//!  - The `0th` dimension is reserved as the batch dimension
//!  - Tensors may fill in other dimensions
//!
//! ### Ordering
//!
//! Every copy a batch issues is enqueued on one stream and never waited on
//! individually. Inputs gathered before compute is launched are visible to
//! compute, and outputs are scattered after it, purely by submission order.
//! [`Batch::finalize`] synchronizes the stream once, and only when scattering
//! queued work.
//!
//! ### Zero copy
//!
//! When every request's data for an input already sits back to back in the
//! memory the model wants, the batch tensor aliases it and nothing is copied.
//!
//! ## Features
//!
//! - **candle** - Conversions between tensors and candle tensors
//! - **burn** - Conversions from tensors to burn tensor data
//!
//! ## Configuration
//!
//! Pinned staging of host inputs and outputs is enabled by default and can be
//! switched off per batch through [`BatchConfig`], or from the environment with
//! [`BatchConfig::from_env`].
//!

pub mod config;
pub mod core;
pub mod error;
pub mod memory;
pub mod stream;
pub mod tensor;

/// Constants for client reference
pub use tensor::constant;

pub use config::{BatchConfig, ModelMetadata};
pub use crate::core::{Batch, BatchStats, InputDescriptor, RequestSource, Response, ResponseSink};
pub use error::{Error, Result};
pub use memory::{Buffer, DeviceId, MemoryLocation, MemorySpace};
pub use stream::{HostStream, HostTask, StreamId, StreamProvider};
pub use tensor::Tensor;
