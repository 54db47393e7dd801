use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotations::PathClass;
use crate::error::ConsistencyError;

/// Bijection between classes and dense label indices `[0, K)`.
///
/// Serialized as explicit `(class, index)` entries; reading a map back goes
/// through [`LabelMap::from_entries`], so sparse indices are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<LabelEntry>", try_from = "Vec<LabelEntry>")]
pub struct LabelMap {
    classes: Vec<PathClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelEntry {
    class: PathClass,
    index: usize,
}

impl From<LabelMap> for Vec<LabelEntry> {
    fn from(map: LabelMap) -> Self {
        map.classes
            .into_iter()
            .enumerate()
            .map(|(index, class)| LabelEntry { class, index })
            .collect()
    }
}

impl TryFrom<Vec<LabelEntry>> for LabelMap {
    type Error = ConsistencyError;

    fn try_from(entries: Vec<LabelEntry>) -> Result<Self, Self::Error> {
        LabelMap::from_entries(entries.into_iter().map(|entry| (entry.class, entry.index)))
    }
}

impl LabelMap {
    /// Label map over the distinct classes, indexed in sorted name order.
    pub fn from_classes<I>(classes: I) -> Self
    where
        I: IntoIterator<Item = PathClass>,
    {
        let mut classes: Vec<PathClass> = classes.into_iter().collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Build from explicit `(class, index)` pairs.
    ///
    /// When two classes claim the same index the later one wins and the
    /// collision is logged. Indices must end up covering `[0, K)` densely.
    pub fn from_entries<I>(entries: I) -> Result<Self, ConsistencyError>
    where
        I: IntoIterator<Item = (PathClass, usize)>,
    {
        let mut by_index: BTreeMap<usize, PathClass> = BTreeMap::new();
        for (class, index) in entries {
            if let Some(previous) = by_index.insert(index, class.clone()) {
                if previous != class {
                    warn!(
                        "Duplicate label index {index}: {previous} replaced by {class}"
                    );
                }
            }
        }
        let expected = by_index.keys().next_back().map_or(0, |max| max + 1);
        let missing = expected - by_index.len();
        if missing > 0 {
            return Err(ConsistencyError::SparseLabels { expected, missing });
        }
        Ok(Self {
            classes: by_index.into_values().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[PathClass] {
        &self.classes
    }

    pub fn class(&self, index: usize) -> Option<&PathClass> {
        self.classes.get(index)
    }

    pub fn index_of(&self, class: &PathClass) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    pub fn names(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_deduplicated() {
        let map = LabelMap::from_classes(["Tumor", "Stroma", "Tumor"].map(PathClass::from));
        assert_eq!(map.names(), vec!["Stroma", "Tumor"]);
        assert_eq!(map.index_of(&"Tumor".into()), Some(1));
    }

    #[test]
    fn duplicate_index_keeps_last_writer() {
        let map = LabelMap::from_entries([
            (PathClass::from("A"), 0),
            (PathClass::from("B"), 0),
            (PathClass::from("C"), 1),
        ])
        .unwrap();
        assert_eq!(map.names(), vec!["B", "C"]);
    }

    #[test]
    fn serialized_maps_list_their_indices() {
        let map = LabelMap::from_classes(["Tumor", "Stroma"].map(PathClass::from));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"[{"class":"Stroma","index":0},{"class":"Tumor","index":1}]"#
        );
        assert_eq!(serde_json::from_str::<LabelMap>(&json).unwrap(), map);
        let sparse = r#"[{"class":"Stroma","index":0},{"class":"Tumor","index":3}]"#;
        assert!(serde_json::from_str::<LabelMap>(sparse).is_err());
    }

    #[test]
    fn sparse_indices_are_rejected() {
        let err = LabelMap::from_entries([(PathClass::from("A"), 0), (PathClass::from("B"), 2)])
            .unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::SparseLabels {
                expected: 3,
                missing: 1
            }
        );
    }
}
