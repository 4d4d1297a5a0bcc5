//! rollcall-core — Face embedding index and nearest-match engine.
//!
//! Keeps one reference embedding per employee in a directory-backed store,
//! builds an in-memory index from it, and resolves captured faces to
//! employees by cosine similarity. Embeddings come from any [`Extractor`];
//! [`FacenetExtractor`] runs FaceNet via ONNX Runtime.

pub mod aggregate;
pub mod extractor;
pub mod facenet;
pub mod index;
pub mod matcher;
pub mod store;
pub mod types;

pub use aggregate::{aggregate, register, Registration, RegistrationError};
pub use extractor::{Extraction, Extractor};
pub use facenet::{FacenetError, FacenetExtractor};
pub use index::{build_index, BuildReport, Index, IndexError, SharedIndex};
pub use matcher::{CosineMatcher, MatchResult, Matcher};
pub use store::{EmbeddingStore, PhotoStore, StoreError};
pub use types::Embedding;
