/// Batch iteration over selected folds of a dataset split
use candle_core::{Device, Result, Tensor};
use std::sync::Arc;

use super::numpy_dataset::EarDataset;
use crate::config::Split;
use crate::EarError;

/// Data loader yielding (spectrogram, label) batches from chosen folds
pub struct FoldDataLoader {
    dataset: Arc<EarDataset>,
    split: Split,
    folds: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
    /// (fold, slot) positions in iteration order
    positions: Vec<(usize, usize)>,
    shuffle: bool,
}

impl FoldDataLoader {
    /// Create a loader over `folds` (indices into the split's fold axis)
    pub fn new(
        dataset: Arc<EarDataset>,
        split: Split,
        folds: &[usize],
        batch_size: usize,
        shuffle: bool,
    ) -> crate::Result<Self> {
        if batch_size == 0 {
            return Err(EarError::Config("batch_size must be > 0".to_string()));
        }

        let tensors = dataset.split(split);
        let num_folds = tensors.num_folds();
        if let Some(&fold) = folds.iter().find(|&&f| f >= num_folds) {
            return Err(EarError::FoldOutOfRange {
                split,
                fold,
                range: 0..num_folds,
            });
        }
        for (i, fold) in folds.iter().enumerate() {
            if folds[..i].contains(fold) {
                return Err(EarError::Config(format!("fold {} selected more than once", fold)));
            }
        }

        let samples_per_fold = tensors.samples_per_fold();
        let positions = folds
            .iter()
            .flat_map(|&fold| (0..samples_per_fold).map(move |slot| (fold, slot)))
            .collect();

        let mut loader = Self {
            dataset,
            split,
            folds: folds.to_vec(),
            batch_size,
            current_idx: 0,
            positions,
            shuffle,
        };
        loader.shuffle_positions();
        Ok(loader)
    }

    /// Loaders over every training fold except `held_out`, and over `held_out` alone
    pub fn cross_validation(
        dataset: Arc<EarDataset>,
        held_out: usize,
        batch_size: usize,
        shuffle: bool,
    ) -> crate::Result<(Self, Self)> {
        let num_folds = dataset.split(Split::Training).num_folds();
        if held_out >= num_folds {
            return Err(EarError::FoldOutOfRange {
                split: Split::Training,
                fold: held_out,
                range: 0..num_folds,
            });
        }

        let train_folds: Vec<usize> = (0..num_folds).filter(|&f| f != held_out).collect();
        let train = Self::new(dataset.clone(), Split::Training, &train_folds, batch_size, shuffle)?;
        let eval = Self::new(dataset, Split::Training, &[held_out], batch_size, false)?;
        Ok((train, eval))
    }

    fn shuffle_positions(&mut self) {
        if self.shuffle {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            self.positions.shuffle(&mut rng);
        }
    }

    /// Get next batch: inputs (batch, height, width) F32, labels (batch,) U32
    pub fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.positions.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.positions.len());
        let batch_positions = &self.positions[self.current_idx..end_idx];
        let actual_batch_size = batch_positions.len();

        let tensors = self.dataset.split(self.split);
        let (height, width) = tensors.sample_shape();

        let mut input_data = Vec::with_capacity(actual_batch_size * height * width);
        let mut target_data = Vec::with_capacity(actual_batch_size);

        for &(fold, slot) in batch_positions {
            input_data.extend(tensors.sample(fold, slot).iter().copied());

            let label = tensors.label(fold, slot);
            let label = u32::try_from(label).map_err(|_| {
                candle_core::Error::Msg(format!(
                    "label {} at fold {} slot {} is not a valid u32 class index",
                    label, fold, slot
                ))
            })?;
            target_data.push(label);
        }

        self.current_idx = end_idx;

        let input_tensor =
            Tensor::from_vec(input_data, (actual_batch_size, height, width), device)?;
        let target_tensor = Tensor::from_vec(target_data, actual_batch_size, device)?;

        Ok(Some((input_tensor, target_tensor)))
    }

    /// Reset loader for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        self.shuffle_positions();
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        (self.positions.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn num_samples(&self) -> usize {
        self.positions.len()
    }

    pub fn folds(&self) -> &[usize] {
        &self.folds
    }

    pub fn dataset(&self) -> &EarDataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for FoldDataLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        FoldDataLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        FoldDataLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        FoldDataLoader::num_batches(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetConfig;
    use crate::data::{BatchDataLoader, DatasetBuilder, SampleKey, SplitTensors};
    use candle_core::DType;
    use ndarray::{Array2, Array4};
    use std::path::Path;

    /// 3 training folds and 1 validation fold of 2 slots; every sample is
    /// filled with `fold * 10 + slot` and labelled with its slot.
    fn dataset() -> Arc<EarDataset> {
        let config = DatasetConfig {
            sample_categories: vec![0, 1],
            sample_shape: (2, 2),
            training_folds: 3,
            validation_folds: 1,
            samples_per_fold: 2,
        };
        let mut builder = DatasetBuilder::new(config).unwrap();
        for fold in 0..4 {
            for slot in 0..2 {
                let name = format!("{}-{}-{}.npy", slot, fold, slot);
                let key = SampleKey::parse(&name).unwrap();
                let split = if fold < 3 { Split::Training } else { Split::Validation };
                let sample = Array2::from_elem((2, 2), (fold * 10 + slot) as f32);
                builder.insert(split, &key, sample.view(), Path::new(&name)).unwrap();
            }
        }
        Arc::new(builder.finish())
    }

    #[test]
    fn test_batches_cover_selected_folds() -> Result<()> {
        let device = Device::Cpu;
        let mut loader =
            FoldDataLoader::new(dataset(), Split::Training, &[0, 2], 3, false).unwrap();
        assert_eq!(loader.num_samples(), 4);
        assert_eq!(loader.num_batches(), 2);

        let (x, y) = loader.next_batch(&device)?.unwrap();
        assert_eq!(x.dims(), &[3, 2, 2]);
        assert_eq!(y.dtype(), DType::U32);
        assert_eq!(y.to_vec1::<u32>()?, vec![0, 1, 0]);
        let firsts: Vec<f32> = x.flatten_from(1)?.narrow(1, 0, 1)?.squeeze(1)?.to_vec1()?;
        assert_eq!(firsts, vec![0.0, 1.0, 20.0]);

        let (x, _) = loader.next_batch(&device)?.unwrap();
        assert_eq!(x.dims(), &[1, 2, 2]);
        assert!(loader.next_batch(&device)?.is_none());

        loader.reset();
        assert!(loader.next_batch(&device)?.is_some());
        Ok(())
    }

    #[test]
    fn test_shuffled_epoch_visits_each_slot_once() -> Result<()> {
        let device = Device::Cpu;
        let mut loader =
            FoldDataLoader::new(dataset(), Split::Training, &[0, 1, 2], 4, true).unwrap();

        let mut seen = Vec::new();
        while let Some((x, _)) = BatchDataLoader::next_batch(&mut loader, &device)? {
            let values: Vec<f32> = x.flatten_from(1)?.narrow(1, 0, 1)?.squeeze(1)?.to_vec1()?;
            seen.extend(values.into_iter().map(|v| v as u32));
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 10, 11, 20, 21]);
        Ok(())
    }

    #[test]
    fn test_validation_split() -> Result<()> {
        let device = Device::Cpu;
        let mut loader =
            FoldDataLoader::new(dataset(), Split::Validation, &[0], 8, false).unwrap();
        let (x, y) = loader.next_batch(&device)?.unwrap();
        assert_eq!(x.dims(), &[2, 2, 2]);
        assert_eq!(y.to_vec1::<u32>()?, vec![0, 1]);
        assert_eq!(x.flatten_all()?.to_vec1::<f32>()?[0], 30.0);
        Ok(())
    }

    #[test]
    fn test_cross_validation_holds_out_one_fold() {
        let (train, eval) = FoldDataLoader::cross_validation(dataset(), 1, 2, true).unwrap();
        assert_eq!(train.folds(), &[0, 2]);
        assert_eq!(eval.folds(), &[1]);
        assert_eq!(train.num_samples(), 4);
        assert_eq!(eval.num_samples(), 2);

        assert!(FoldDataLoader::cross_validation(dataset(), 3, 2, false).is_err());
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(matches!(
            FoldDataLoader::new(dataset(), Split::Validation, &[1], 2, false),
            Err(EarError::FoldOutOfRange { fold: 1, .. })
        ));
        assert!(matches!(
            FoldDataLoader::new(dataset(), Split::Training, &[0], 0, false),
            Err(EarError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_repeated_folds() {
        assert!(matches!(
            FoldDataLoader::new(dataset(), Split::Training, &[0, 2, 0], 2, false),
            Err(EarError::Config(_))
        ));
    }

    #[test]
    fn test_negative_label_is_an_error() {
        let split = SplitTensors {
            inputs: Array4::zeros((1, 2, 2, 2)),
            labels: Array2::from_shape_vec((1, 2), vec![1, -1]).unwrap(),
        };
        let dataset = Arc::new(EarDataset::from_parts(split.clone(), split, None));
        let mut loader = FoldDataLoader::new(dataset, Split::Training, &[0], 2, false).unwrap();

        assert!(loader.next_batch(&Device::Cpu).is_err());
    }
}
