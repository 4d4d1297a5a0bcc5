//! Durable per-identity embedding storage.
//!
//! Layout under the photos root:
//!
//! ```text
//! <root>/<identity>/img_0.jpg      source photos (any of jpg/jpeg/png)
//! <root>/<identity>/embedding.json averaged, normalized embedding
//! ```

use crate::types::Embedding;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File holding an identity's persisted embedding.
pub const EMBEDDING_FILE: &str = "embedding.json";

/// Extensions (lowercase) treated as source photos.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid identity {0:?}: must be a non-empty name without path separators")]
    InvalidIdentity(String),
    #[error("no folder for identity {0}")]
    IdentityNotFound(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt embedding at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage keyed by identity: one embedding per identity plus the photos it
/// can be derived from.
pub trait EmbeddingStore {
    /// All known identities, sorted.
    fn identities(&self) -> Result<Vec<String>, StoreError>;

    /// The persisted embedding for `identity`, or `None` if none was saved yet.
    /// An identity the store does not know is an error, not `None`.
    fn load(&self, identity: &str) -> Result<Option<Embedding>, StoreError>;

    /// Persist `embedding`, replacing any previous one.
    fn save(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError>;

    /// Source photos for `identity`, sorted by file name.
    fn source_images(&self, identity: &str) -> Result<Vec<PathBuf>, StoreError>;
}

/// Directory-backed store: one folder per identity under `root`.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for `identity`, after validating the key.
    fn folder(&self, identity: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_identity(identity) {
            return Err(StoreError::InvalidIdentity(identity.to_string()));
        }
        Ok(self.root.join(identity))
    }

    /// Folder for `identity`, which must already exist.
    fn existing_folder(&self, identity: &str) -> Result<PathBuf, StoreError> {
        let folder = self.folder(identity)?;
        if !folder.is_dir() {
            return Err(StoreError::IdentityNotFound(identity.to_string()));
        }
        Ok(folder)
    }
}

impl EmbeddingStore for PhotoStore {
    fn identities(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_valid_identity(&name) => ids.push(name),
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %entry.path().display(), "skipping folder with unusable name");
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load(&self, identity: &str) -> Result<Option<Embedding>, StoreError> {
        let path = self.existing_folder(identity)?.join(EMBEDDING_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let embedding = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(embedding))
    }

    fn save(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let folder = self.existing_folder(identity)?;
        let path = folder.join(EMBEDDING_FILE);

        let json = serde_json::to_vec(embedding).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        // Uniquely named temp file in the same folder, so concurrent writers
        // never share one and the final rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(&folder).map_err(|e| io_err(&folder, e))?;
        tmp.write_all(&json).map_err(|e| io_err(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;

        tracing::debug!(identity, dim = embedding.dim(), "embedding saved");
        Ok(())
    }

    fn source_images(&self, identity: &str) -> Result<Vec<PathBuf>, StoreError> {
        let folder = self.existing_folder(identity)?;
        let entries = fs::read_dir(&folder).map_err(|e| io_err(&folder, e))?;

        let mut images = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&folder, e))?.path();
            if path.is_file() && is_image(&path) {
                images.push(path);
            }
        }
        images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(images)
    }
}

/// An identity names a single folder: non-empty, no separators, not `.`/`..`.
pub fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty()
        && identity != "."
        && identity != ".."
        && !identity.contains(['/', '\\', '\0'])
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(ids: &[&str]) -> (tempfile::TempDir, PhotoStore) {
        let dir = tempfile::tempdir().unwrap();
        for id in ids {
            fs::create_dir(dir.path().join(id)).unwrap();
        }
        let store = PhotoStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store_with(&["EMP001"]);
        let e = Embedding::new(vec![0.6, 0.8]).with_model_version("facenet128");

        store.save("EMP001", &e).unwrap();
        assert_eq!(store.load("EMP001").unwrap(), Some(e));
        let files: Vec<_> = fs::read_dir(store.root().join("EMP001")).unwrap().collect();
        assert_eq!(files.len(), 1, "temp file left behind");
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, store) = store_with(&["EMP001"]);
        store.save("EMP001", &Embedding::new(vec![1.0, 0.0])).unwrap();
        store.save("EMP001", &Embedding::new(vec![0.0, 1.0])).unwrap();
        assert_eq!(
            store.load("EMP001").unwrap().unwrap().values,
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn test_load_absent() {
        let (_dir, store) = store_with(&["EMP001"]);
        assert_eq!(store.load("EMP001").unwrap(), None);
    }

    #[test]
    fn test_load_unknown_identity_fails() {
        let (_dir, store) = store_with(&["EMP001"]);
        let err = store.load("EMP999").unwrap_err();
        assert!(matches!(err, StoreError::IdentityNotFound(id) if id == "EMP999"));
    }

    #[test]
    fn test_concurrent_saves_leave_one_file() {
        let (_dir, store) = store_with(&["EMP001"]);
        std::thread::scope(|s| {
            for i in 0..8 {
                let store = &store;
                s.spawn(move || {
                    let e = Embedding::new(vec![i as f32, 1.0]);
                    for _ in 0..20 {
                        store.save("EMP001", &e).unwrap();
                    }
                });
            }
        });

        let stored = store.load("EMP001").unwrap().unwrap();
        assert_eq!(stored.values[1], 1.0);
        let names: Vec<String> = fs::read_dir(store.root().join("EMP001"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![EMBEDDING_FILE]);
    }

    #[test]
    fn test_save_without_folder_fails() {
        let (_dir, store) = store_with(&[]);
        let err = store.save("EMP404", &Embedding::new(vec![1.0])).unwrap_err();
        assert!(matches!(err, StoreError::IdentityNotFound(id) if id == "EMP404"));
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let (_dir, store) = store_with(&[]);
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(
                matches!(store.load(bad), Err(StoreError::InvalidIdentity(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_corrupt_embedding() {
        let (dir, store) = store_with(&["EMP001"]);
        fs::write(dir.path().join("EMP001").join(EMBEDDING_FILE), b"{oops").unwrap();
        assert!(matches!(store.load("EMP001"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_identities_sorted_dirs_only() {
        let (dir, store) = store_with(&["b", "a", "c"]);
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(store.identities().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_identities_missing_root_is_error() {
        let store = PhotoStore::new("/nonexistent/rollcall/photos");
        assert!(matches!(store.identities(), Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_source_images_filtered_and_sorted() {
        let (dir, store) = store_with(&["EMP001"]);
        let folder = dir.path().join("EMP001");
        for name in ["img_2.jpg", "img_0.PNG", "img_1.jpeg", "notes.txt", EMBEDDING_FILE] {
            fs::write(folder.join(name), b"x").unwrap();
        }

        let names: Vec<String> = store
            .source_images("EMP001")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["img_0.PNG", "img_1.jpeg", "img_2.jpg"]);
    }

    #[test]
    fn test_source_images_unknown_identity() {
        let (_dir, store) = store_with(&[]);
        assert!(matches!(
            store.source_images("EMP001"),
            Err(StoreError::IdentityNotFound(_))
        ));
    }
}
