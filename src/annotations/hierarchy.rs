use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PathClass, Roi};

/// A user-drawn labeled region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub roi: Roi,
    #[serde(default)]
    pub class: Option<PathClass>,
    #[serde(default)]
    pub z: usize,
    #[serde(default)]
    pub t: usize,
}

impl Annotation {
    pub fn new(id: u64, roi: Roi, class: Option<PathClass>) -> Self {
        Self {
            id,
            roi,
            class,
            z: 0,
            t: 0,
        }
    }

    /// Class to train on, if the annotation carries a usable one.
    pub fn training_class(&self) -> Option<&PathClass> {
        self.class.as_ref().filter(|class| !class.is_ignored())
    }
}

/// Read-only view of the annotations drawn on an image.
pub trait AnnotationHierarchy: Send + Sync {
    /// Snapshot of every annotation currently in the hierarchy.
    fn annotations(&self) -> Vec<Annotation>;
}

/// Kind of object touched by a hierarchy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Annotation,
    Detection,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedObject {
    pub kind: ObjectKind,
    pub class: Option<PathClass>,
}

impl ChangedObject {
    pub fn annotation(class: Option<PathClass>) -> Self {
        Self {
            kind: ObjectKind::Annotation,
            class,
        }
    }
}

/// Notification emitted by the hierarchy when objects change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyEvent {
    pub is_changing: bool,
    pub is_structural: bool,
    pub is_classification: bool,
    pub is_measurement_only: bool,
    pub changed: Vec<ChangedObject>,
}

impl HierarchyEvent {
    /// Whether the event can change the training samples.
    ///
    /// In-progress edits and measurement updates never count; otherwise the
    /// change must carry a classification and touch at least one annotation.
    pub fn affects_training(&self) -> bool {
        if self.is_changing || self.is_measurement_only {
            return false;
        }
        if !(self.is_structural || self.is_classification || !self.changed.is_empty()) {
            return false;
        }
        let classified =
            self.is_classification || self.changed.iter().any(|object| object.class.is_some());
        classified
            && self
                .changed
                .iter()
                .any(|object| object.kind == ObjectKind::Annotation)
    }
}

#[derive(Debug, Error)]
pub enum AnnotationSetError {
    #[error("Failed to read annotations {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid annotations JSON {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Plain owned list of annotations, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub annotations: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self { annotations }
    }

    pub fn load_json(path: &Path) -> Result<Self, AnnotationSetError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotationSetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| AnnotationSetError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl AnnotationHierarchy for AnnotationSet {
    fn annotations(&self) -> Vec<Annotation> {
        self.annotations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(changed: Vec<ChangedObject>) -> HierarchyEvent {
        HierarchyEvent {
            is_structural: true,
            changed,
            ..HierarchyEvent::default()
        }
    }

    #[test]
    fn classified_annotation_change_affects_training() {
        let ev = event(vec![ChangedObject::annotation(Some("Tumor".into()))]);
        assert!(ev.affects_training());
    }

    #[test]
    fn changing_and_measurement_events_are_ignored() {
        let mut ev = event(vec![ChangedObject::annotation(Some("Tumor".into()))]);
        ev.is_changing = true;
        assert!(!ev.affects_training());
        ev.is_changing = false;
        ev.is_measurement_only = true;
        assert!(!ev.affects_training());
    }

    #[test]
    fn unclassified_or_detection_changes_are_ignored() {
        assert!(!event(vec![ChangedObject::annotation(None)]).affects_training());
        let detection = ChangedObject {
            kind: ObjectKind::Detection,
            class: Some("Tumor".into()),
        };
        assert!(!event(vec![detection]).affects_training());
        assert!(!event(Vec::new()).affects_training());
    }

    #[test]
    fn classification_event_counts_without_classes() {
        let ev = HierarchyEvent {
            is_classification: true,
            changed: vec![ChangedObject::annotation(None)],
            ..HierarchyEvent::default()
        };
        assert!(ev.affects_training());
    }

    #[test]
    fn annotation_set_loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        let set = AnnotationSet::new(vec![Annotation::new(
            1,
            Roi::rectangle(0.0, 0.0, 4.0, 4.0),
            Some("Tumor".into()),
        )]);
        std::fs::write(&path, serde_json::to_vec(&set).unwrap()).unwrap();
        let loaded = AnnotationSet::load_json(&path).unwrap();
        assert_eq!(loaded, set);
        assert!(matches!(
            AnnotationSet::load_json(&dir.path().join("missing.json")),
            Err(AnnotationSetError::Read { .. })
        ));
    }
}
