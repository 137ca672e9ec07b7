/// Build the EAR fold tensors from spectrogram folders, then read them back
use candle_core::Device;
use ear_dataset::data::DatasetMetadata;
use ear_dataset::{generate, DatasetConfig, EarDataset, FoldDataLoader, Split};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== EAR Dataset - Fold Tensor Generation ===");

    let mut args = std::env::args().skip(1);
    let training_dir = args.next().unwrap_or_else(|| "data/train".to_string());
    let validation_dir = args.next().unwrap_or_else(|| "data/validation".to_string());
    let output_dir = args.next().unwrap_or_else(|| "data/ear".to_string());

    let config = DatasetConfig::default();
    log::info!("Dataset configuration: {:#?}", config);

    let dataset = generate(&training_dir, &validation_dir, &output_dir, &config)?;

    for split in [Split::Training, Split::Validation] {
        if let Some(coverage) = dataset.coverage(split) {
            log::info!("{} slots written per fold: {:?}", split, coverage.per_fold());
        }
    }
    if let Err(e) = dataset.ensure_complete() {
        log::warn!("{}", e);
    }

    // Read back what was just written
    let Some(reloaded) = EarDataset::load(&output_dir)? else {
        anyhow::bail!("no dataset at {}", output_dir);
    };
    log::info!("Reloaded dataset matches: {}", reloaded == dataset);
    log::info!("  - train_x: {:?}", reloaded.train_x().shape());
    log::info!("  - train_y: {:?}", reloaded.train_y().shape());
    log::info!("  - test_x: {:?}", reloaded.test_x().shape());
    log::info!("  - test_y: {:?}", reloaded.test_y().shape());

    if let Some(metadata) = DatasetMetadata::read(&output_dir)? {
        log::info!("  - Examples written: {}", metadata.num_examples);
    }

    // Fold 0 held out, as a cross-validation consumer would use it
    let device = Device::Cpu;
    let (mut train, eval) = FoldDataLoader::cross_validation(Arc::new(reloaded), 0, 32, true)?;
    log::info!(
        "Cross-validation: {} training batches, {} held-out batches",
        train.num_batches(),
        eval.num_batches()
    );
    if let Some((x, y)) = train.next_batch(&device)? {
        log::info!("First batch: inputs {:?}, labels {:?}", x.dims(), y.dims());
    }

    Ok(())
}
