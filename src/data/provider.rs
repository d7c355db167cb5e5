use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::data::csv::parse_table;
use crate::data::dataset::Dataset;
use crate::error::DataFormatError;

/// Source of a training `Dataset`.
pub trait DataProvider {
    fn load(&self) -> Result<Dataset, DataFormatError>;
}

/// Reads a features CSV (N × D floats) and a labels CSV (N × 1 class indices),
/// both without header rows.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    pub features_path: PathBuf,
    pub labels_path: PathBuf,
    pub num_classes: usize,
}

impl CsvDataProvider {
    pub fn new(
        features_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
        num_classes: usize,
    ) -> CsvDataProvider {
        CsvDataProvider {
            features_path: features_path.into(),
            labels_path: labels_path.into(),
            num_classes,
        }
    }
}

impl DataProvider for CsvDataProvider {
    fn load(&self) -> Result<Dataset, DataFormatError> {
        let features: Vec<Vec<f64>> = parse_table(&read(&self.features_path)?, &self.features_path)?;
        debug!(path = %self.features_path.display(), rows = features.len(), "parsed feature table");

        let label_rows: Vec<Vec<usize>> = parse_table(&read(&self.labels_path)?, &self.labels_path)?;
        if label_rows[0].len() != 1 {
            return Err(DataFormatError::LabelColumns {
                path: self.labels_path.clone(),
                row: 1,
                found: label_rows[0].len(),
            });
        }
        let labels: Vec<usize> = label_rows.into_iter().map(|row| row[0]).collect();

        let dataset = Dataset::from_rows(features, labels, self.num_classes)?;
        info!(samples = dataset.len(), "Loaded {} training samples", dataset.len());
        info!(input_size = dataset.input_size(), "Input size: {}", dataset.input_size());
        Ok(dataset)
    }
}

fn read(path: &Path) -> Result<String, DataFormatError> {
    std::fs::read_to_string(path).map_err(|source| DataFormatError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_pair(features: &str, labels: &str) -> (tempfile::TempDir, CsvDataProvider) {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("features.csv");
        let l = dir.path().join("labels.csv");
        fs::write(&f, features).unwrap();
        fs::write(&l, labels).unwrap();
        let provider = CsvDataProvider::new(f, l, 8);
        (dir, provider)
    }

    #[test]
    fn loads_matching_tables() {
        let (_dir, provider) = write_pair("0.1,0.2,0.3\n0.4,0.5,0.6\n", "3\n7\n");
        let ds = provider.load().unwrap();
        assert_eq!(ds.features().shape(), (2, 3));
        assert_eq!(ds.labels(), &[3, 7]);
    }

    #[test]
    fn multi_column_labels_are_rejected() {
        let (_dir, provider) = write_pair("1\n2\n", "0,1\n1,0\n");
        assert!(matches!(provider.load(), Err(DataFormatError::LabelColumns { found: 2, .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let provider = CsvDataProvider::new("/nonexistent/f.csv", "/nonexistent/l.csv", 8);
        assert!(matches!(provider.load(), Err(DataFormatError::Read { .. })));
    }
}
