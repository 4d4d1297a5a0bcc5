//! In-memory gallery index and the builder that fills it from an
//! [`EmbeddingStore`].
//!
//! The index is rebuilt wholesale whenever the store changes and published
//! through a [`SharedIndex`]; it is never patched in place.

use crate::extractor::{Extraction, Extractor};
use crate::store::{EmbeddingStore, StoreError};
use crate::types::Embedding;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding for {identity} has dimension {actual}, index holds dimension {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Identity → embedding mapping, iterated in identity order.
///
/// All embeddings share one dimension, fixed by the first insert.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: BTreeMap<String, Embedding>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the embedding for `identity`.
    ///
    /// Returns the previous embedding, if any. Fails if the dimension differs
    /// from the embeddings already held (unless it replaces the only entry).
    pub fn insert(
        &mut self,
        identity: impl Into<String>,
        embedding: Embedding,
    ) -> Result<Option<Embedding>, IndexError> {
        let identity = identity.into();
        if let Some(expected) = self.dim() {
            let replaces_sole = self.entries.len() == 1 && self.entries.contains_key(&identity);
            if expected != embedding.dim() && !replaces_sole {
                return Err(IndexError::DimensionMismatch {
                    identity,
                    expected,
                    actual: embedding.dim(),
                });
            }
        }
        Ok(self.entries.insert(identity, embedding))
    }

    pub fn get(&self, identity: &str) -> Option<&Embedding> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every embedding, `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.entries.values().next().map(Embedding::dim)
    }

    /// Entries in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Swappable handle to the current index.
///
/// Readers take an `Arc` snapshot and match against it without holding the
/// lock; a rebuild publishes a complete replacement in one assignment.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Arc<Index>>,
}

impl SharedIndex {
    pub fn new(index: Index) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now. Later publishes do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Index> {
        // The lock only guards an Arc assignment, so a poisoned lock still
        // holds a complete index.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Replace the current index, returning the one it replaced.
    pub fn publish(&self, index: Index) -> Arc<Index> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

/// What a build found, identity by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Identities whose persisted embedding was used.
    pub loaded: Vec<String>,
    /// Identities whose embedding was computed from a photo and persisted.
    pub computed: Vec<String>,
    /// Identities with no persisted embedding and no usable photo.
    pub missing: Vec<String>,
}

impl BuildReport {
    pub fn indexed(&self) -> usize {
        self.loaded.len() + self.computed.len()
    }
}

/// Build a fresh index from every identity in `store`.
///
/// Identities without a persisted embedding get one computed from the first
/// photo (in file-name order) that yields a face; it is normalized and saved
/// before entering the index. Identities with no usable photo are left out
/// and listed in [`BuildReport::missing`].
pub fn build_index<S, E>(store: &S, extractor: &mut E) -> Result<(Index, BuildReport), IndexError>
where
    S: EmbeddingStore + ?Sized,
    E: Extractor + ?Sized,
{
    let mut index = Index::new();
    let mut report = BuildReport::default();

    for identity in store.identities()? {
        if let Some(embedding) = store.load(&identity)? {
            index.insert(identity.clone(), embedding)?;
            report.loaded.push(identity);
            continue;
        }

        match first_usable_embedding(store, extractor, &identity)? {
            Some(embedding) => {
                store.save(&identity, &embedding)?;
                index.insert(identity.clone(), embedding)?;
                report.computed.push(identity);
            }
            None => {
                tracing::warn!(identity = %identity, "no usable photo; identity left out of index");
                report.missing.push(identity);
            }
        }
    }

    tracing::info!(
        indexed = index.len(),
        loaded = report.loaded.len(),
        computed = report.computed.len(),
        missing = report.missing.len(),
        "index built"
    );
    Ok((index, report))
}

fn first_usable_embedding<S, E>(
    store: &S,
    extractor: &mut E,
    identity: &str,
) -> Result<Option<Embedding>, IndexError>
where
    S: EmbeddingStore + ?Sized,
    E: Extractor + ?Sized,
{
    for path in store.source_images(identity)? {
        match extractor.extract_file(&path) {
            Extraction::Face(embedding) => {
                tracing::debug!(identity, path = %path.display(), "embedding computed from photo");
                return Ok(Some(embedding.normalized()));
            }
            Extraction::NoFace => {
                tracing::debug!(identity, path = %path.display(), "no face in photo");
            }
            Extraction::Failed(reason) => {
                tracing::warn!(identity, path = %path.display(), reason = %reason, "extraction failed");
            }
        }
    }
    Ok(None)
}
