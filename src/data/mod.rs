/// Dataset generation, persistence and batch loading
pub mod builder;
pub mod loader;
pub mod naming;
pub mod numpy_dataset;

pub use builder::{generate, Coverage, DatasetBuilder, Placement};
pub use loader::FoldDataLoader;
pub use naming::SampleKey;
pub use numpy_dataset::{DatasetMetadata, EarDataset, SplitTensors};

use candle_core::{Device, Result, Tensor};

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch of (input, target) tensors
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}
