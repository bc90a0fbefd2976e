//! Shape resolution for batch-wide tensors.
//!
//! Inputs are batched raggedly: every request contributes its own number of
//! examples along [`BATCH_DIM`], and all other dimensions must agree. Outputs
//! take their shape from model metadata, scaled by the total batch size.

use crate::config::ModelMetadata;
use crate::error::{Error, Result};
use super::constant::BATCH_DIM;

/// Number of elements described by `shape`. A rank-0 shape is a scalar.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Unifies per-request input shapes into one batch shape.
///
/// The batch dimension is summed across requests; every other dimension must
/// match the first request exactly. The first disagreeing request is named in
/// the returned [`Error::IncompatibleShape`]. An empty list yields `[0]`, a
/// batch of no examples.
pub fn input_shape(name: &str, shapes: &[Vec<usize>]) -> Result<Vec<usize>> {
    let Some(template) = shapes.first() else {
        return Ok(vec![0]);
    };

    let mut total = 0;
    for (request_index, shape) in shapes.iter().enumerate() {
        if shape.is_empty() {
            // no batch dimension to concatenate along
            return Err(Error::IncompatibleShape {
                name: name.to_string(),
                request_index,
                expected: vec![1],
                found: shape.clone(),
            });
        }
        if shape.len() != template.len() || shape[BATCH_DIM + 1..] != template[BATCH_DIM + 1..] {
            let mut expected = template.clone();
            expected[BATCH_DIM] = shape[BATCH_DIM];
            return Err(Error::IncompatibleShape {
                name: name.to_string(),
                request_index,
                expected,
                found: shape.clone(),
            });
        }
        total += shape[BATCH_DIM];
    }

    let mut unified = template.clone();
    unified[BATCH_DIM] = total;
    Ok(unified)
}

/// Shape of the batch-wide buffer for output `name`.
///
/// For batching models this is `[total_batch_size, ..per_example]`; models
/// that do not batch use the metadata shape as is.
pub fn output_shape(name: &str, model: &ModelMetadata, total_batch_size: usize) -> Result<Vec<usize>> {
    let per_example = model
        .output_shape(name)
        .ok_or_else(|| Error::UnknownOutput(name.to_string()))?;

    if !model.is_batching() {
        return Ok(per_example.to_vec());
    }
    if total_batch_size > model.max_batch_size() {
        return Err(Error::BatchTooLarge {
            batch_size: total_batch_size,
            max_batch_size: model.max_batch_size(),
        });
    }

    let mut shape = Vec::with_capacity(per_example.len() + 1);
    shape.push(total_batch_size);
    shape.extend_from_slice(per_example);
    Ok(shape)
}

/// The part of a batch shape that belongs to one request holding
/// `request_batch_size` examples.
pub fn request_shape(batch_shape: &[usize], request_batch_size: usize, model: &ModelMetadata) -> Vec<usize> {
    let mut shape = batch_shape.to_vec();
    if model.is_batching() && !shape.is_empty() {
        shape[BATCH_DIM] = request_batch_size;
    }
    shape
}
