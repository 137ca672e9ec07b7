/// Fold-partitioned dataset generation from a directory of sample files
use ndarray::{s, Array2, ArrayView2};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use std::path::{Path, PathBuf};

use super::naming::SampleKey;
use super::numpy_dataset::{BuildRecord, EarDataset, SplitTensors};
use crate::config::{DatasetConfig, Split};
use crate::EarError;

/// Files processed between progress messages
const PROGRESS_EVERY: usize = 1000;

/// Which (fold, slot) positions of a split have been written
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    written: Array2<bool>,
}

impl Coverage {
    pub fn new(folds: usize, samples_per_fold: usize) -> Self {
        Self {
            written: Array2::from_elem((folds, samples_per_fold), false),
        }
    }

    /// Mark a slot as written, returning whether it already was
    fn mark(&mut self, fold: usize, slot: usize) -> bool {
        std::mem::replace(&mut self.written[[fold, slot]], true)
    }

    pub fn is_written(&self, fold: usize, slot: usize) -> bool {
        self.written[[fold, slot]]
    }

    pub fn written_count(&self, fold: usize) -> usize {
        self.written.row(fold).iter().filter(|&&w| w).count()
    }

    /// Written slot count for every fold
    pub fn per_fold(&self) -> Vec<usize> {
        (0..self.written.nrows())
            .map(|fold| self.written_count(fold))
            .collect()
    }

    /// Positions that were never written, in (fold, slot) order
    pub fn missing(&self) -> Vec<(usize, usize)> {
        self.written
            .indexed_iter()
            .filter(|(_, written)| !**written)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|&w| w)
    }
}

/// Where a sample ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub split: Split,
    pub fold: usize,
    pub slot: usize,
    /// An earlier sample in the same position was replaced
    pub overwrote: bool,
}

/// Accumulates samples into zero-initialized, fixed-capacity tensors.
///
/// A builder covers one generation pass; `finish` hands back the immutable
/// dataset.
pub struct DatasetBuilder {
    config: DatasetConfig,
    train: SplitTensors,
    test: SplitTensors,
    train_coverage: Coverage,
    test_coverage: Coverage,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig) -> crate::Result<Self> {
        config.validate()?;

        let train = SplitTensors::zeros(&config, Split::Training);
        let test = SplitTensors::zeros(&config, Split::Validation);
        let train_coverage = Coverage::new(config.training_folds, config.samples_per_fold);
        let test_coverage = Coverage::new(config.validation_folds, config.samples_per_fold);

        Ok(Self {
            config,
            train,
            test,
            train_coverage,
            test_coverage,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn coverage(&self, split: Split) -> &Coverage {
        match split {
            Split::Training => &self.train_coverage,
            Split::Validation => &self.test_coverage,
        }
    }

    /// Write one sample at the position its key maps to.
    ///
    /// Fold range, category and shape are checked before anything is written.
    /// A second sample mapping to the same position replaces the first.
    pub fn insert(
        &mut self,
        split: Split,
        key: &SampleKey,
        sample: ArrayView2<f32>,
        source: &Path,
    ) -> crate::Result<Placement> {
        let fold = key.split_fold(split, &self.config)?;

        if !self.config.contains_category(key.category) {
            return Err(EarError::UnknownCategory {
                path: source.to_path_buf(),
                category: key.category,
            });
        }

        if sample.dim() != self.config.sample_shape {
            return Err(EarError::ShapeMismatch {
                path: source.to_path_buf(),
                expected: self.config.sample_shape,
                found: sample.shape().to_vec(),
            });
        }

        let slot = key.slot(self.config.samples_per_fold);
        let (tensors, coverage) = match split {
            Split::Training => (&mut self.train, &mut self.train_coverage),
            Split::Validation => (&mut self.test, &mut self.test_coverage),
        };

        tensors.inputs.slice_mut(s![fold, slot, .., ..]).assign(&sample);
        tensors.labels[[fold, slot]] = key.category;

        let overwrote = coverage.mark(fold, slot);
        if overwrote {
            log::debug!(
                "{:?} overwrote {} fold {} slot {}",
                source,
                split,
                fold,
                slot
            );
        }

        Ok(Placement {
            split,
            fold,
            slot,
            overwrote,
        })
    }

    /// Read and insert every sample file under `dir`, in sorted path order.
    ///
    /// Returns the number of files processed.
    pub fn insert_dir<P: AsRef<Path>>(&mut self, split: Split, dir: P) -> crate::Result<usize> {
        let dir = dir.as_ref();
        log::info!("Loading {} samples from: {:?}", split, dir);

        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        for (i, path) in files.iter().enumerate() {
            let key = SampleKey::parse(path)?;
            let sample = read_sample(path)?;
            self.insert(split, &key, sample.view(), path)?;

            if (i + 1) % PROGRESS_EVERY == 0 {
                log::info!("  {} {} samples processed", i + 1, split);
            }
        }

        log::info!(
            "Loaded {} {} samples, {} slots written",
            files.len(),
            split,
            self.coverage(split).per_fold().iter().sum::<usize>()
        );

        Ok(files.len())
    }

    pub fn finish(self) -> EarDataset {
        EarDataset::from_parts(
            self.train,
            self.test,
            Some(BuildRecord {
                config: self.config,
                train_coverage: self.train_coverage,
                test_coverage: self.test_coverage,
            }),
        )
    }
}

/// Build both splits from their source trees and persist them under `output_dir`.
///
/// Fails on the first bad file; nothing is skipped.
pub fn generate<P, Q, R>(
    training_dir: P,
    validation_dir: Q,
    output_dir: R,
    config: &DatasetConfig,
) -> crate::Result<EarDataset>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let mut builder = DatasetBuilder::new(config.clone())?;
    builder.insert_dir(Split::Training, training_dir)?;
    builder.insert_dir(Split::Validation, validation_dir)?;

    let dataset = builder.finish();
    dataset.save(output_dir)?;
    Ok(dataset)
}

/// Recursively collect regular files
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Load one spectrogram. `f64` payloads are narrowed to `f32`.
fn read_sample(path: &Path) -> crate::Result<Array2<f32>> {
    let bytes = std::fs::read(path)?;
    let npy_err = |e: ReadNpyError| EarError::Npy(format!("Failed to read {:?}: {}", path, e));

    match <Array2<f32> as ReadNpyExt>::read_npy(bytes.as_slice()) {
        Ok(sample) => Ok(sample),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let wide = <Array2<f64> as ReadNpyExt>::read_npy(bytes.as_slice()).map_err(npy_err)?;
            Ok(wide.mapv(|x| x as f32))
        }
        Err(e) => Err(npy_err(e)),
    }
}
