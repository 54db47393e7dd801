use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the synthetic class assigned to boundary pixels.
pub const BOUNDARY_CLASS_NAME: &str = "Boundary*";

/// Class label attached to annotations, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathClass {
    name: String,
}

impl PathClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The synthetic class used for `DerivedThickness` boundaries.
    pub fn boundary() -> Self {
        Self::new(BOUNDARY_CLASS_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unnamed classes and names ending in `*` never contribute training samples.
    pub fn is_ignored(&self) -> bool {
        self.name.trim().is_empty() || self.name.ends_with('*')
    }

    /// Stable display color derived from the class name.
    pub fn color(&self) -> [u8; 3] {
        let hash = blake3::hash(self.name.as_bytes());
        let bytes = hash.as_bytes();
        // Keep colors away from near-black so overlays stay visible.
        [bytes[0] | 0x40, bytes[1] | 0x40, bytes[2] | 0x40]
    }
}

impl fmt::Display for PathClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for PathClass {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_classes() {
        assert!(PathClass::new("").is_ignored());
        assert!(PathClass::new("Ignore*").is_ignored());
        assert!(PathClass::boundary().is_ignored());
        assert!(!PathClass::new("Tumor").is_ignored());
    }

    #[test]
    fn color_is_stable_per_name() {
        assert_eq!(PathClass::new("Tumor").color(), PathClass::new("Tumor").color());
        assert!(PathClass::new("Stroma").color().iter().all(|c| *c >= 0x40));
    }

    #[test]
    fn serializes_as_plain_name() {
        let json = serde_json::to_string(&PathClass::new("Stroma")).unwrap();
        assert_eq!(json, "\"Stroma\"");
    }
}
