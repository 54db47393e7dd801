use ndarray::{Array2, Axis};

use super::LabelMap;
use crate::error::ConsistencyError;

/// Feature rows with their dense class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    features: Array2<f32>,
    labels: Vec<usize>,
    label_map: LabelMap,
    feature_names: Vec<String>,
}

impl SampleTable {
    pub fn new(
        features: Array2<f32>,
        labels: Vec<usize>,
        label_map: LabelMap,
        feature_names: Vec<String>,
    ) -> Result<Self, ConsistencyError> {
        if features.nrows() != labels.len() {
            return Err(ConsistencyError::RowCountMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        if features.ncols() != feature_names.len() {
            return Err(ConsistencyError::FeatureNameMismatch {
                columns: features.ncols(),
                names: feature_names.len(),
            });
        }
        if let Some((row, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, label)| **label >= label_map.len())
        {
            return Err(ConsistencyError::LabelOutOfRange {
                row,
                label,
                classes: label_map.len(),
            });
        }
        Ok(Self {
            features,
            labels,
            label_map,
            feature_names,
        })
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of rows per label index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.label_map.len()];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// New table holding the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> SampleTable {
        SampleTable {
            features: self.features.select(Axis(0), rows),
            labels: rows.iter().map(|&row| self.labels[row]).collect(),
            label_map: self.label_map.clone(),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Same rows and labels with replaced feature columns.
    pub fn with_features(
        &self,
        features: Array2<f32>,
        feature_names: Vec<String>,
    ) -> Result<SampleTable, ConsistencyError> {
        SampleTable::new(
            features,
            self.labels.clone(),
            self.label_map.clone(),
            feature_names,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::PathClass;
    use ndarray::array;

    fn map() -> LabelMap {
        LabelMap::from_classes([PathClass::from("A"), PathClass::from("B")])
    }

    #[test]
    fn validates_shapes_and_labels() {
        let names = vec!["f".to_string()];
        assert!(matches!(
            SampleTable::new(array![[1.0f32]], vec![0, 1], map(), names.clone()),
            Err(ConsistencyError::RowCountMismatch { rows: 1, labels: 2 })
        ));
        assert!(matches!(
            SampleTable::new(array![[1.0f32], [2.0]], vec![0, 2], map(), names.clone()),
            Err(ConsistencyError::LabelOutOfRange { row: 1, label: 2, classes: 2 })
        ));
        assert!(matches!(
            SampleTable::new(array![[1.0f32, 2.0]], vec![0], map(), names),
            Err(ConsistencyError::FeatureNameMismatch { columns: 2, names: 1 })
        ));
    }

    #[test]
    fn select_rows_keeps_labels_aligned() {
        let table = SampleTable::new(
            array![[1.0f32], [2.0], [3.0]],
            vec![0, 1, 1],
            map(),
            vec!["f".into()],
        )
        .unwrap();
        assert_eq!(table.class_counts(), vec![1, 2]);
        let subset = table.select_rows(&[2, 0]);
        assert_eq!(subset.labels(), &[1, 0]);
        assert_eq!(subset.features(), &array![[3.0f32], [1.0]]);
    }
}
