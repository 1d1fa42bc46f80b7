//! Golden digests.
//!
//! Expected [`digest`]s live in `golden/digests.json` next to this crate's
//! manifest.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use cvx_core::digest;

/// Named expected digests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoldenSet {
    pub version: String,
    pub entries: BTreeMap<String, String>,
}

/// Result of checking one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoldenStatus {
    Match,
    Mismatch { expected: String },
    Missing,
}

impl GoldenSet {
    /// Path of the checked-in golden file.
    pub fn default_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("golden").join("digests.json")
    }

    /// The checked-in golden file.
    pub fn builtin() -> io::Result<Self> {
        Self::load(Self::default_path())
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, content + "\n")
    }

    pub fn insert(&mut self, name: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(name.into(), digest.into());
    }

    pub fn check(&self, name: &str, actual: &str) -> GoldenStatus {
        match self.entries.get(name) {
            Some(expected) if expected == actual => GoldenStatus::Match,
            Some(expected) => GoldenStatus::Mismatch {
                expected: expected.clone(),
            },
            None => GoldenStatus::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvx_core::Image;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_loads() {
        let set = GoldenSet::builtin().unwrap();
        assert!(set.entries.contains_key("rgb_to_gray_gradient_512_rgba"));
    }

    #[test]
    fn test_save_load_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("digests.json");

        let img = Image::filled(3, 3, &[1, 2, 3]).unwrap();
        let mut set = GoldenSet {
            version: "1".into(),
            ..GoldenSet::default()
        };
        set.insert("tiny", digest(&img));
        set.save(&path).unwrap();

        let loaded = GoldenSet::load(&path).unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.check("tiny", &digest(&img)), GoldenStatus::Match);
        assert!(matches!(loaded.check("tiny", "00"), GoldenStatus::Mismatch { .. }));
        assert_eq!(loaded.check("other", "00"), GoldenStatus::Missing);
    }
}
