/// Fold-partitioned dataset tensors and their NumPy (.npy) persistence
use ndarray::{Array2, Array4, ArrayView2, ArrayView3};
use ndarray_npy::{ReadNpyExt, ReadableElement, WritableElement, WriteNpyExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::builder::Coverage;
use crate::config::{DatasetConfig, Split};
use crate::EarError;

pub const TRAIN_X_FILE: &str = "train_x.npy";
pub const TRAIN_Y_FILE: &str = "train_y.npy";
pub const TEST_X_FILE: &str = "test_x.npy";
pub const TEST_Y_FILE: &str = "test_y.npy";
pub const METADATA_FILE: &str = "dataset.json";

/// Metadata sidecar written next to the tensors
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub config: DatasetConfig,
    /// Written slots per training fold
    pub train_coverage: Vec<usize>,
    /// Written slots per validation fold
    pub test_coverage: Vec<usize>,
    #[serde(default)]
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
}

impl DatasetMetadata {
    /// Read `dataset.json` from a dataset directory, if present
    pub fn read<P: AsRef<Path>>(dir: P) -> crate::Result<Option<Self>> {
        let path = dir.as_ref().join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }
}

/// Inputs and labels of one split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTensors {
    /// [folds, samples_per_fold, height, width]
    pub inputs: Array4<f32>,
    /// [folds, samples_per_fold]
    pub labels: Array2<i64>,
}

impl SplitTensors {
    pub fn zeros(config: &DatasetConfig, split: Split) -> Self {
        let folds = config.split_folds(split);
        let (height, width) = config.sample_shape;
        Self {
            inputs: Array4::zeros((folds, config.samples_per_fold, height, width)),
            labels: Array2::zeros((folds, config.samples_per_fold)),
        }
    }

    pub fn num_folds(&self) -> usize {
        self.labels.nrows()
    }

    pub fn samples_per_fold(&self) -> usize {
        self.labels.ncols()
    }

    /// (height, width) of one sample
    pub fn sample_shape(&self) -> (usize, usize) {
        let (_, _, height, width) = self.inputs.dim();
        (height, width)
    }

    /// All samples of one fold, [samples_per_fold, height, width]
    pub fn fold_inputs(&self, fold: usize) -> ArrayView3<f32> {
        self.inputs.index_axis(ndarray::Axis(0), fold)
    }

    pub fn sample(&self, fold: usize, slot: usize) -> ArrayView2<f32> {
        self.fold_inputs(fold).index_axis_move(ndarray::Axis(0), slot)
    }

    pub fn label(&self, fold: usize, slot: usize) -> i64 {
        self.labels[[fold, slot]]
    }
}

/// Config and coverage from the generation pass that produced a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRecord {
    pub config: DatasetConfig,
    pub train_coverage: Coverage,
    pub test_coverage: Coverage,
}

/// Finished training and validation tensors
#[derive(Debug, Clone)]
pub struct EarDataset {
    train: SplitTensors,
    test: SplitTensors,
    build: Option<BuildRecord>,
}

impl PartialEq for EarDataset {
    /// Datasets are equal when their tensors are; build history is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.train == other.train && self.test == other.test
    }
}

impl EarDataset {
    pub(crate) fn from_parts(
        train: SplitTensors,
        test: SplitTensors,
        build: Option<BuildRecord>,
    ) -> Self {
        Self { train, test, build }
    }

    pub fn split(&self, split: Split) -> &SplitTensors {
        match split {
            Split::Training => &self.train,
            Split::Validation => &self.test,
        }
    }

    pub fn train_x(&self) -> &Array4<f32> {
        &self.train.inputs
    }

    pub fn train_y(&self) -> &Array2<i64> {
        &self.train.labels
    }

    pub fn test_x(&self) -> &Array4<f32> {
        &self.test.inputs
    }

    pub fn test_y(&self) -> &Array2<i64> {
        &self.test.labels
    }

    /// (train_x, train_y, test_x, test_y)
    pub fn into_arrays(self) -> (Array4<f32>, Array2<i64>, Array4<f32>, Array2<i64>) {
        (
            self.train.inputs,
            self.train.labels,
            self.test.inputs,
            self.test.labels,
        )
    }

    /// Build history, present only for datasets produced by a builder
    pub fn build_record(&self) -> Option<&BuildRecord> {
        self.build.as_ref()
    }

    /// Coverage of a split, unknown for datasets read back from disk
    pub fn coverage(&self, split: Split) -> Option<&Coverage> {
        self.build.as_ref().map(|b| match split {
            Split::Training => &b.train_coverage,
            Split::Validation => &b.test_coverage,
        })
    }

    /// Fail if any slot of either split was never written.
    ///
    /// Datasets without coverage information pass.
    pub fn ensure_complete(&self) -> crate::Result<()> {
        for split in [Split::Training, Split::Validation] {
            if let Some(coverage) = self.coverage(split) {
                let missing = coverage.missing();
                if !missing.is_empty() {
                    return Err(EarError::IncompleteCoverage { split, missing });
                }
            }
        }
        Ok(())
    }

    /// Write the four tensors, and the metadata sidecar when build history is
    /// known, under `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> crate::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        log::info!("Saving dataset to: {:?}", dir);

        write_array(&dir.join(TRAIN_X_FILE), &self.train.inputs)?;
        write_array(&dir.join(TRAIN_Y_FILE), &self.train.labels)?;
        write_array(&dir.join(TEST_X_FILE), &self.test.inputs)?;
        write_array(&dir.join(TEST_Y_FILE), &self.test.labels)?;

        if let Some(build) = &self.build {
            let train_coverage = build.train_coverage.per_fold();
            let test_coverage = build.test_coverage.per_fold();
            let metadata = DatasetMetadata {
                num_examples: train_coverage.iter().chain(&test_coverage).sum(),
                config: build.config.clone(),
                train_coverage,
                test_coverage,
                description: "EAR spectrogram folds".to_string(),
            };
            let mut writer = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
            serde_json::to_writer_pretty(&mut writer, &metadata)?;
            writer.flush()?;
        }

        log::info!(
            "Saved train_x {:?}, test_x {:?}",
            self.train.inputs.shape(),
            self.test.inputs.shape()
        );

        Ok(())
    }

    /// Read the four tensors from `dir`.
    ///
    /// A missing file is `EarError::DatasetNotFound`. Shapes and contents are
    /// returned as stored.
    pub fn try_load<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref();

        log::info!("Loading dataset from: {:?}", dir);

        let train = SplitTensors {
            inputs: read_array(&dir.join(TRAIN_X_FILE))?,
            labels: read_array(&dir.join(TRAIN_Y_FILE))?,
        };
        let test = SplitTensors {
            inputs: read_array(&dir.join(TEST_X_FILE))?,
            labels: read_array(&dir.join(TEST_Y_FILE))?,
        };

        log::info!(
            "Loaded train_x {:?}, test_x {:?}",
            train.inputs.shape(),
            test.inputs.shape()
        );

        Ok(Self::from_parts(train, test, None))
    }

    /// Like `try_load`, but a missing dataset is reported and yields `None`.
    pub fn load<P: AsRef<Path>>(dir: P) -> crate::Result<Option<Self>> {
        match Self::try_load(dir) {
            Ok(dataset) => Ok(Some(dataset)),
            Err(EarError::DatasetNotFound(path)) => {
                log::warn!("Dataset file not found: {:?}, returning no data", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn write_array<A, D>(path: &Path, array: &ndarray::Array<A, D>) -> crate::Result<()>
where
    A: WritableElement,
    D: ndarray::Dimension,
{
    let mut writer = BufWriter::new(File::create(path)?);
    array
        .write_npy(&mut writer)
        .map_err(|e| EarError::Npy(format!("Failed to write {:?}: {}", path, e)))?;
    writer.flush()?;
    Ok(())
}

fn read_array<A, D>(path: &Path) -> crate::Result<ndarray::Array<A, D>>
where
    A: ReadableElement,
    D: ndarray::Dimension,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EarError::DatasetNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    <ndarray::Array<A, D> as ReadNpyExt>::read_npy(BufReader::new(file))
        .map_err(|e| EarError::Npy(format!("Failed to read {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetBuilder, SampleKey};
    use tempfile::TempDir;

    fn small_config() -> DatasetConfig {
        DatasetConfig {
            sample_categories: vec![0, 1, 2, 3],
            sample_shape: (3, 2),
            training_folds: 2,
            validation_folds: 1,
            samples_per_fold: 2,
        }
    }

    fn populated() -> crate::Result<EarDataset> {
        let mut builder = DatasetBuilder::new(small_config())?;
        let entries = [
            (Split::Training, "0-0-1"),
            (Split::Training, "1-0-2"),
            (Split::Training, "2-1-3"),
            (Split::Training, "3-1-0"),
            (Split::Validation, "4-2-1"),
            (Split::Validation, "5-2-2"),
        ];
        for (i, (split, name)) in entries.iter().enumerate() {
            let key = SampleKey::parse(name)?;
            let sample = Array2::from_shape_fn((3, 2), |(r, c)| (i * 10 + r * 2 + c) as f32 + 0.25);
            builder.insert(*split, &key, sample.view(), Path::new(name))?;
        }
        Ok(builder.finish())
    }

    #[test]
    fn test_metadata_deserialization() {
        let json = r#"{
            "config": {
                "sample_categories": [0, 1, 2, 3],
                "sample_shape": [128, 259],
                "training_folds": 9,
                "validation_folds": 1,
                "samples_per_fold": 2400
            },
            "train_coverage": [2400, 2400, 2400, 2400, 2400, 2400, 2400, 2400, 2400],
            "test_coverage": [2400]
        }"#;

        let metadata: DatasetMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.config, DatasetConfig::default());
        assert_eq!(metadata.train_coverage.len(), 9);
        assert_eq!(metadata.num_examples, 0);
        assert!(metadata.description.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip_is_bit_equal() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        let dataset = populated()?;
        dataset.save(tmp.path())?;

        let loaded = EarDataset::load(tmp.path())?.expect("dataset should exist");
        assert_eq!(loaded, dataset);
        assert_eq!(loaded.train_x(), dataset.train_x());
        assert_eq!(loaded.test_y(), dataset.test_y());
        assert_eq!(loaded.split(Split::Training).sample(1, 0)[[2, 1]], 25.25);
        assert!(loaded.coverage(Split::Training).is_none());
        Ok(())
    }

    #[test]
    fn test_load_twice_is_idempotent() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        populated()?.save(tmp.path())?;

        let first = EarDataset::try_load(tmp.path())?;
        let second = EarDataset::try_load(tmp.path())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_load_missing_returns_none() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        assert!(EarDataset::load(tmp.path())?.is_none());
        assert!(EarDataset::load(tmp.path().join("absent"))?.is_none());
        Ok(())
    }

    #[test]
    fn test_load_with_one_file_missing() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        populated()?.save(tmp.path())?;
        std::fs::remove_file(tmp.path().join(TEST_Y_FILE))?;

        assert!(matches!(
            EarDataset::try_load(tmp.path()),
            Err(EarError::DatasetNotFound(path)) if path.ends_with(TEST_Y_FILE)
        ));
        assert!(EarDataset::load(tmp.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_load_corrupt_file_is_an_error() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        populated()?.save(tmp.path())?;
        std::fs::write(tmp.path().join(TRAIN_X_FILE), b"not an npy file")?;

        assert!(matches!(EarDataset::load(tmp.path()), Err(EarError::Npy(_))));
        Ok(())
    }

    #[test]
    fn test_save_writes_metadata() -> crate::Result<()> {
        let tmp = TempDir::new()?;
        populated()?.save(tmp.path())?;

        let metadata = DatasetMetadata::read(tmp.path())?.expect("metadata should exist");
        assert_eq!(metadata.config, small_config());
        assert_eq!(metadata.train_coverage, vec![2, 2]);
        assert_eq!(metadata.test_coverage, vec![2]);
        assert_eq!(metadata.num_examples, 6);
        Ok(())
    }

    #[test]
    fn test_ensure_complete() -> crate::Result<()> {
        let full = populated()?;
        assert!(full.ensure_complete().is_ok());
        assert!(full.coverage(Split::Validation).map_or(false, |c| c.is_complete()));

        let mut builder = DatasetBuilder::new(small_config())?;
        let key = SampleKey::parse("0-0-1")?;
        let blank = Array2::<f32>::zeros((3, 2));
        builder.insert(Split::Training, &key, blank.view(), Path::new("0-0-1"))?;
        let partial = builder.finish();

        match partial.ensure_complete() {
            Err(EarError::IncompleteCoverage { split, missing }) => {
                assert_eq!(split, Split::Training);
                assert_eq!(missing, vec![(0, 1), (1, 0), (1, 1)]);
            }
            other => panic!("expected incomplete coverage, got {:?}", other),
        }
        Ok(())
    }
}
