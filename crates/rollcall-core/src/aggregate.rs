//! Registration: fold an employee's captured photos into one reference
//! embedding and persist it.

use crate::extractor::{Extraction, Extractor};
use crate::store::{EmbeddingStore, StoreError};
use crate::types::Embedding;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("no images found for {0}")]
    NoImages(String),
    #[error("no usable face in any image for {0}")]
    NoUsableFace(String),
    #[error("embeddings for {identity} disagree on dimension ({expected} vs {actual})")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub embedding: Embedding,
    /// Images that produced an embedding.
    pub used: usize,
    /// Images skipped because extraction found no face or failed.
    pub skipped: usize,
}

/// Average the embeddings of `images` into one normalized vector for
/// `identity` and save it, replacing any previous one.
///
/// Nothing is written unless at least one image yields a face.
pub fn aggregate<S, E>(
    store: &S,
    extractor: &mut E,
    identity: &str,
    images: &[PathBuf],
) -> Result<Registration, RegistrationError>
where
    S: EmbeddingStore + ?Sized,
    E: Extractor + ?Sized,
{
    if images.is_empty() {
        return Err(RegistrationError::NoImages(identity.to_string()));
    }

    let mut vectors: Vec<Embedding> = Vec::with_capacity(images.len());
    for path in images {
        match extractor.extract_file(path) {
            Extraction::Face(embedding) => {
                if let Some(first) = vectors.first() {
                    if first.dim() != embedding.dim() {
                        return Err(RegistrationError::DimensionMismatch {
                            identity: identity.to_string(),
                            expected: first.dim(),
                            actual: embedding.dim(),
                        });
                    }
                }
                vectors.push(embedding);
            }
            Extraction::NoFace => {
                tracing::debug!(identity, path = %path.display(), "no face in photo");
            }
            Extraction::Failed(reason) => {
                tracing::warn!(identity, path = %path.display(), reason = %reason, "extraction failed");
            }
        }
    }

    let embedding = Embedding::mean(&vectors)
        .ok_or_else(|| RegistrationError::NoUsableFace(identity.to_string()))?
        .normalized();
    store.save(identity, &embedding)?;

    let used = vectors.len();
    let skipped = images.len() - used;
    tracing::info!(identity, used, skipped, dim = embedding.dim(), "registration embedding saved");

    Ok(Registration {
        embedding,
        used,
        skipped,
    })
}

/// Register `identity` from every photo in its store folder.
pub fn register<S, E>(store: &S, extractor: &mut E, identity: &str) -> Result<Registration, RegistrationError>
where
    S: EmbeddingStore + ?Sized,
    E: Extractor + ?Sized,
{
    let images = store.source_images(identity)?;
    aggregate(store, extractor, identity, &images)
}
