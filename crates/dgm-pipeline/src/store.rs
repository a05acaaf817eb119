//! Durable storage for diagram sources.
//!
//! [`UnitStore`] writes extracted units to individual source files and loads
//! standalone source files back as units.

use std::path::{Path, PathBuf};

use crate::consts::SOURCE_EXTENSION;
use crate::unit::ExtractionUnit;

/// Error returned by the source store.
///
/// Every variant is fatal for a run: without durable sources no render can proceed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Writes and reads diagram source files.
#[derive(Debug, Clone)]
pub struct UnitStore {
    extension: String,
}

impl Default for UnitStore {
    fn default() -> Self {
        Self {
            extension: SOURCE_EXTENSION.to_owned(),
        }
    }
}

impl UnitStore {
    /// Create a store using the default `mmd` extension.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file extension used for source files (without the dot).
    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Path a unit is persisted to inside `destination_dir`.
    #[must_use]
    pub fn path_for(&self, unit: &ExtractionUnit, destination_dir: &Path) -> PathBuf {
        destination_dir.join(format!("{}.{}", unit.id(), self.extension))
    }

    /// Write a unit's source to `destination_dir/<id>.<ext>`.
    ///
    /// The directory is created if absent.
    pub fn persist(
        &self,
        unit: &ExtractionUnit,
        destination_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(destination_dir).map_err(|source| StoreError::CreateDir {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        let path = self.path_for(unit, destination_dir);
        std::fs::write(&path, unit.source()).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(unit = unit.id(), path = %path.display(), "Persisted diagram source");
        Ok(path)
    }

    /// Persist all units, stopping at the first failure.
    pub fn persist_all(
        &self,
        units: &[ExtractionUnit],
        destination_dir: &Path,
    ) -> Result<Vec<PathBuf>, StoreError> {
        units
            .iter()
            .map(|unit| self.persist(unit, destination_dir))
            .collect()
    }

    /// Load standalone source files from `dir` as units.
    ///
    /// Files are ordered by name; each unit's id is its file stem and ordinals
    /// follow the sorted order.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<ExtractionUnit>, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::NotFound(dir.to_path_buf()));
        }

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            self.extension
        );
        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| StoreError::Read {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let source = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
                    path: path.clone(),
                    source,
                })?;
                let id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(ExtractionUnit::named(id, i + 1, source))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::IdStrategy;
    use pretty_assertions::assert_eq;

    fn unit(ordinal: usize, source: &str) -> ExtractionUnit {
        ExtractionUnit::derived(ordinal, source.to_owned(), IdStrategy::Ordinal)
    }

    #[test]
    fn test_persist_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("nested/sources");

        let path = UnitStore::new().persist(&unit(1, "graph A-->B\n"), &dest).unwrap();

        assert_eq!(path, dest.join("diagram_1.mmd"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "graph A-->B\n");
    }

    #[test]
    fn test_persist_existing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let store = UnitStore::new();

        store.persist(&unit(1, "a"), temp.path()).unwrap();
        let path = store.persist(&unit(2, "b"), temp.path()).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "b");
    }

    #[test]
    fn test_persist_fails_when_directory_is_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = UnitStore::new().persist(&unit(1, "a"), &blocker).unwrap_err();

        assert!(matches!(err, StoreError::CreateDir { .. }), "got {err:?}");
    }

    #[test]
    fn test_load_dir_sorted_by_name() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("b_flow.mmd"), "graph B").unwrap();
        std::fs::write(temp.path().join("a_seq.mmd"), "sequenceDiagram").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let units = UnitStore::new().load_dir(temp.path()).unwrap();

        let ids: Vec<_> = units.iter().map(ExtractionUnit::id).collect();
        assert_eq!(ids, vec!["a_seq", "b_flow"]);
        assert_eq!(units[0].ordinal(), 1);
        assert_eq!(units[1].ordinal(), 2);
        assert_eq!(units[1].source(), "graph B");
    }

    #[test]
    fn test_load_dir_custom_extension() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("one.txt"), "graph A").unwrap();

        let units = UnitStore::new().extension("txt").load_dir(temp.path()).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id(), "one");
    }

    #[test]
    fn test_load_dir_missing() {
        let temp = tempfile::tempdir().unwrap();
        let err = UnitStore::new()
            .load_dir(&temp.path().join("missing"))
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_persist_then_load_keeps_ids() {
        let temp = tempfile::tempdir().unwrap();
        let store = UnitStore::new();
        let units = vec![unit(1, "graph A-->B"), unit(2, "graph C-->D")];

        store.persist_all(&units, temp.path()).unwrap();
        let loaded = store.load_dir(temp.path()).unwrap();

        assert_eq!(loaded, units);
    }
}
