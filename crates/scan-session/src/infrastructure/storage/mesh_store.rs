//! On-disk layout of saved meshes.
//!
//! Two naming conventions are in use under a store root:
//!
//! ```text
//! {root}/{unix_millis}/scan.ply     (nested, the default)
//! {root}/{unix_millis}.ply          (flat)
//! ```
//!
//! The store only names, prepares and enumerates files.  Writing the mesh is
//! the engine's job.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use scan_core::ScanError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MESH_EXTENSION: &str = "ply";
const NESTED_FILE_NAME: &str = "scan.ply";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLayout {
    /// One directory per scan holding `scan.ply`.
    #[default]
    Nested,
    /// One `.ply` file per scan directly under the root.
    Flat,
}

/// A mesh found under the store root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMesh {
    pub path: PathBuf,
    /// File stem for flat entries, directory name for nested ones.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MeshStore {
    root: PathBuf,
    layout: StoreLayout,
}

impl MeshStore {
    pub fn new(root: impl Into<PathBuf>, layout: StoreLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    /// Path for a scan named `stem` under this store's layout.
    pub fn path_for(&self, stem: &str) -> PathBuf {
        match self.layout {
            StoreLayout::Nested => self.root.join(stem).join(NESTED_FILE_NAME),
            StoreLayout::Flat => self.root.join(format!("{stem}.{MESH_EXTENSION}")),
        }
    }

    /// Path for a new scan, named by the current Unix time in milliseconds.
    pub fn next_path(&self) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.path_for(&millis.to_string())
    }

    /// Creates the parent directories of `path`.
    pub fn prepare(&self, path: &Path) -> Result<(), ScanError> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|source| ScanError::Storage {
                    path: dir.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    /// Lists stored meshes in file-system order.  A missing root is empty.
    pub fn list(&self) -> Result<Vec<StoredMesh>, ScanError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ScanError::Storage {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut meshes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ScanError::Storage {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();

            if path.is_dir() {
                let nested = path.join(NESTED_FILE_NAME);
                if nested.is_file() {
                    meshes.push(StoredMesh {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        path: nested,
                    });
                }
            } else if path.extension().is_some_and(|ext| ext == MESH_EXTENSION) {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                meshes.push(StoredMesh { path, name });
            }
        }
        debug!("{} stored meshes under {}", meshes.len(), self.root.display());
        Ok(meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("scansession-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_path_for_follows_layout() {
        let nested = MeshStore::new("/data/scans", StoreLayout::Nested);
        let flat = MeshStore::new("/data/scans", StoreLayout::Flat);

        assert_eq!(
            nested.path_for("1700000000000"),
            PathBuf::from("/data/scans/1700000000000/scan.ply")
        );
        assert_eq!(
            flat.path_for("1700000000000"),
            PathBuf::from("/data/scans/1700000000000.ply")
        );
    }

    #[test]
    fn test_next_path_is_numeric_timestamp() {
        let store = MeshStore::new("scans", StoreLayout::Flat);

        let path = store.next_path();

        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        assert!(stem.parse::<u128>().is_ok(), "stem {stem} is not a timestamp");
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let store = MeshStore::new(temp_root(), StoreLayout::Nested);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_finds_both_layouts_and_skips_other_files() {
        // Arrange
        let root = temp_root();
        let store = MeshStore::new(&root, StoreLayout::Nested);
        let nested = store.path_for("first");
        store.prepare(&nested).unwrap();
        std::fs::write(&nested, "ply\n").unwrap();
        std::fs::write(root.join("second.ply"), "ply\n").unwrap();
        std::fs::write(root.join("notes.txt"), "not a mesh").unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();

        // Act
        let mut names: Vec<String> = store.list().unwrap().into_iter().map(|m| m.name).collect();
        names.sort();

        // Assert
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
        let _ = std::fs::remove_dir_all(&root);
    }
}
