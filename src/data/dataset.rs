use crate::error::DataFormatError;
use crate::math::matrix::Matrix;

/// Row-aligned features and class labels.
///
/// Invariants (checked by `from_rows`): at least one row, every feature row
/// has the same width, one label per row, and every label is below
/// `num_classes`.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Matrix,
    labels: Vec<usize>,
    num_classes: usize,
}

impl Dataset {
    pub fn from_rows(
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> Result<Dataset, DataFormatError> {
        if features.len() != labels.len() {
            return Err(DataFormatError::RowCountMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        if features.is_empty() {
            return Err(DataFormatError::Empty { path: "<features>".into() });
        }
        let width = features[0].len();
        if let Some(i) = features.iter().position(|row| row.len() != width) {
            return Err(DataFormatError::RaggedRow {
                path: "<features>".into(),
                row: i + 1,
                expected: width,
                found: features[i].len(),
            });
        }
        if let Some(i) = labels.iter().position(|&label| label >= num_classes) {
            return Err(DataFormatError::LabelOutOfRange {
                row: i + 1,
                label: labels[i],
                num_classes,
            });
        }

        Ok(Dataset {
            features: Matrix::from_data(features),
            labels,
            num_classes,
        })
    }

    pub fn features(&self) -> &Matrix {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// N
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// D
    pub fn input_size(&self) -> usize {
        self.features.cols
    }

    /// C
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Copies the given rows (features and labels) in order.
    pub fn batch(&self, indices: &[usize]) -> (Matrix, Vec<usize>) {
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        (self.features.select_rows(indices), labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_follow_rows() {
        let ds = Dataset::from_rows(vec![vec![0.0, 1.0, 2.0]; 4], vec![0, 1, 2, 1], 3).unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.input_size(), 3);
        assert_eq!(ds.features().shape(), (4, 3));
        let (x, y) = ds.batch(&[3, 1]);
        assert_eq!(x.shape(), (2, 3));
        assert_eq!(y, vec![1, 1]);
    }

    #[test]
    fn row_count_mismatch_is_reported_first() {
        let err = Dataset::from_rows(vec![vec![1.0]; 100], vec![0; 99], 8).unwrap_err();
        assert!(matches!(err, DataFormatError::RowCountMismatch { features: 100, labels: 99 }));
    }

    #[test]
    fn label_equal_to_class_count_is_out_of_range() {
        let err = Dataset::from_rows(vec![vec![1.0]; 3], vec![0, 8, 1], 8).unwrap_err();
        assert!(matches!(err, DataFormatError::LabelOutOfRange { row: 2, label: 8, num_classes: 8 }));
    }
}
