/// Sample filename decoding: `<sample_num>-<fold>-<category>.<ext>`
use std::path::Path;

use crate::config::{DatasetConfig, Split};
use crate::EarError;

const FIELD_DELIMITER: char = '-';

/// Metadata encoded in a sample's filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleKey {
    pub sample_num: usize,
    pub fold: usize,
    pub category: i64,
}

impl SampleKey {
    /// Decode a sample filename. Only the file stem is considered; directories
    /// and the extension are ignored.
    pub fn parse<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let malformed = |reason: String| EarError::MalformedFilename {
            path: path.to_path_buf(),
            reason,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| malformed("missing or non UTF-8 file name".to_string()))?;

        let fields: Vec<&str> = stem.split(FIELD_DELIMITER).collect();
        if fields.len() != 3 {
            return Err(malformed(format!(
                "expected 3 '{}'-delimited fields, found {}",
                FIELD_DELIMITER,
                fields.len()
            )));
        }

        let sample_num = fields[0]
            .parse::<usize>()
            .map_err(|e| malformed(format!("sample number {:?}: {}", fields[0], e)))?;
        let fold = fields[1]
            .parse::<usize>()
            .map_err(|e| malformed(format!("fold {:?}: {}", fields[1], e)))?;
        let category = fields[2]
            .parse::<i64>()
            .map_err(|e| malformed(format!("category {:?}: {}", fields[2], e)))?;

        Ok(Self {
            sample_num,
            fold,
            category,
        })
    }

    /// Position inside the fold. Wraps, so sample numbers that agree modulo
    /// the capacity share a slot.
    pub fn slot(&self, samples_per_fold: usize) -> usize {
        self.sample_num % samples_per_fold
    }

    /// Index into the split's fold axis.
    ///
    /// Training folds map by identity; validation folds are re-based by
    /// subtracting `training_folds`.
    pub fn split_fold(&self, split: Split, config: &DatasetConfig) -> crate::Result<usize> {
        let range = config.raw_fold_range(split);
        if !range.contains(&self.fold) {
            return Err(EarError::FoldOutOfRange {
                split,
                fold: self.fold,
                range,
            });
        }
        Ok(self.fold - config.fold_offset(split))
    }
}
