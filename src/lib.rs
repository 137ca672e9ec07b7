//! EAR dataset - fold-partitioned spectrogram tensors
//!
//! Turns a directory of per-sample spectrogram `.npy` files into fixed-shape
//! training and validation tensors, and persists them for fast reuse.
//!
//! # Layout
//!
//! Each source file is named `<sample_num>-<fold>-<category>.<ext>`:
//! - **fold** selects the fold axis (training folds come first, validation
//!   folds continue the numbering)
//! - **sample_num** selects the slot, `sample_num % samples_per_fold`
//! - **category** is written to the label tensor
//!
//! # Example
//!
//! ```ignore
//! use ear_dataset::{generate, DatasetConfig, EarDataset};
//!
//! let config = DatasetConfig::default();
//! let dataset = generate("data/train", "data/validation", "data/ear", &config)?;
//! let reloaded = EarDataset::load("data/ear")?;
//! ```

pub mod config;
pub mod data;

// Re-export commonly used items
pub use config::{DatasetConfig, Split};
pub use data::{generate, DatasetBuilder, EarDataset, FoldDataLoader, SampleKey};

use std::ops::Range;
use std::path::PathBuf;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum EarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed sample filename {path:?}: {reason}")]
    MalformedFilename { path: PathBuf, reason: String },

    #[error("Fold {fold} outside {split} range {range:?}")]
    FoldOutOfRange {
        split: Split,
        fold: usize,
        range: Range<usize>,
    },

    #[error("Unknown category {category} in {path:?}")]
    UnknownCategory { path: PathBuf, category: i64 },

    #[error("Shape mismatch in {path:?}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        found: Vec<usize>,
    },

    #[error("Dataset not found: {0:?}")]
    DatasetNotFound(PathBuf),

    #[error("Incomplete {split} coverage: {} slots never written", .missing.len())]
    IncompleteCoverage {
        split: Split,
        missing: Vec<(usize, usize)>,
    },

    #[error("NumPy error: {0}")]
    Npy(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EarError>;
