//! Annotation classes, shapes and the read-only hierarchy collaborator.

mod classes;
mod hierarchy;
mod roi;

pub use classes::{BOUNDARY_CLASS_NAME, PathClass};
pub use hierarchy::{
    Annotation, AnnotationHierarchy, AnnotationSet, AnnotationSetError, ChangedObject,
    HierarchyEvent, ObjectKind,
};
pub use roi::Roi;
