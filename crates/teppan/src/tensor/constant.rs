/// # Constants with reserved meanings in teppan

/// In a given tensor shape, teppan reserves the `0th` dimension for batching
pub const BATCH_DIM: usize = 0;
