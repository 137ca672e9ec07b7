/// Configuration for the EAR dataset layout
///
/// These values fix the capacity of every tensor a builder allocates.
use std::fmt;
use std::ops::Range;

/// Which partition of the dataset a fold belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Training,
    Validation,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Training => write!(f, "training"),
            Split::Validation => write!(f, "validation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetConfig {
    /// Closed set of category labels a sample may carry
    pub sample_categories: Vec<i64>,

    /// Spectrogram shape (height, width)
    pub sample_shape: (usize, usize),

    /// Number of folds in the training split
    pub training_folds: usize,

    /// Number of folds in the validation split, numbered after the training folds
    pub validation_folds: usize,

    /// Slot capacity of every fold
    pub samples_per_fold: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_categories: vec![0, 1, 2, 3],
            sample_shape: (128, 259),
            training_folds: 9,
            validation_folds: 1,
            samples_per_fold: 2400,
        }
    }
}

impl DatasetConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_shape.0 == 0 || self.sample_shape.1 == 0 {
            return Err(crate::EarError::Config(format!(
                "sample_shape must be non-zero, got {:?}",
                self.sample_shape
            )));
        }

        if self.training_folds == 0 || self.validation_folds == 0 {
            return Err(crate::EarError::Config(
                "training_folds and validation_folds must be > 0".to_string(),
            ));
        }

        if self.samples_per_fold == 0 {
            return Err(crate::EarError::Config(
                "samples_per_fold must be > 0".to_string(),
            ));
        }

        if self.sample_categories.is_empty() {
            return Err(crate::EarError::Config(
                "sample_categories must not be empty".to_string(),
            ));
        }

        if let Some(category) = self.sample_categories.iter().find(|&&c| c < 0) {
            return Err(crate::EarError::Config(format!(
                "sample_categories must be non-negative, got {}",
                category
            )));
        }

        Ok(())
    }

    /// Total number of folds across both splits
    pub fn total_folds(&self) -> usize {
        self.training_folds + self.validation_folds
    }

    /// Number of folds allocated for a split
    pub fn split_folds(&self, split: Split) -> usize {
        match split {
            Split::Training => self.training_folds,
            Split::Validation => self.validation_folds,
        }
    }

    /// Amount subtracted from a raw fold field to index the split's tensor.
    ///
    /// Validation folds are numbered after the training folds in the source
    /// filenames, so they are re-based to zero.
    pub fn fold_offset(&self, split: Split) -> usize {
        match split {
            Split::Training => 0,
            Split::Validation => self.training_folds,
        }
    }

    /// Raw (filename) fold numbers that belong to a split
    pub fn raw_fold_range(&self, split: Split) -> Range<usize> {
        let start = self.fold_offset(split);
        start..start + self.split_folds(split)
    }

    pub fn contains_category(&self, category: i64) -> bool {
        self.sample_categories.contains(&category)
    }
}
