//! # Configuration
//!
//! [`BatchConfig`] carries the serving layer's memory preferences for a
//! batch; [`ModelMetadata`] carries the parts of a model's configuration the
//! marshalling layer needs: whether and how far the model batches, and the
//! per-example shape of each output.

use std::collections::HashMap;
use std::env;
use crate::error::{Error, Result};

/// Environment variable enabling pinned staging for gathered inputs
pub const PINNED_INPUT_ENV: &str = "TEPPAN_PINNED_INPUT";

/// Environment variable enabling pinned staging for scattered outputs
pub const PINNED_OUTPUT_ENV: &str = "TEPPAN_PINNED_OUTPUT";

/// Memory preferences for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Stage pageable host inputs through pinned memory on their way to a device
    pub pinned_input: bool,
    /// Stage device outputs through pinned memory on their way to pageable host responses
    pub pinned_output: bool,
}

impl BatchConfig {
    pub fn with_pinned_input(mut self, enabled: bool) -> Self {
        self.pinned_input = enabled;
        self
    }

    pub fn with_pinned_output(mut self, enabled: bool) -> Self {
        self.pinned_output = enabled;
        self
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            pinned_input: flag_from_env(PINNED_INPUT_ENV, defaults.pinned_input)?,
            pinned_output: flag_from_env(PINNED_OUTPUT_ENV, defaults.pinned_output)?,
        })
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pinned_input: true,
            pinned_output: true,
        }
    }
}

fn flag_from_env(key: &'static str, default: bool) -> Result<bool> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => parse_flag(&value).ok_or(Error::Config { key, value }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The model-side facts needed to shape a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Largest batch the model accepts; `0` means the model does not batch
    max_batch_size: usize,
    /// Output shapes by name, without the batch dimension for batching models
    outputs: HashMap<String, Vec<usize>>,
}

impl ModelMetadata {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            outputs: HashMap::new(),
        }
    }

    /// Registers an output and its per-example shape.
    pub fn with_output(mut self, name: impl Into<String>, shape: Vec<usize>) -> Self {
        self.outputs.insert(name.into(), shape);
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Whether the leading dimension of inputs and outputs is a batch dimension.
    pub fn is_batching(&self) -> bool {
        self.max_batch_size > 0
    }

    pub fn output_shape(&self, name: &str) -> Option<&[usize]> {
        self.outputs.get(name).map(|shape| shape.as_slice())
    }
}
