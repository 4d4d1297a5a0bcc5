//! FaceNet embedding extractor via ONNX Runtime.
//!
//! Runs the whole frame through a FaceNet-128 model exported with an NHWC
//! `1×160×160×3` float input. There is no detector stage: the capture is
//! expected to be framed on a single face, as at an attendance kiosk.

use crate::extractor::{Extraction, Extractor};
use crate::types::Embedding;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACENET_INPUT_SIZE: u32 = 160;
const FACENET_EMBEDDING_DIM: usize = 128;
const FACENET_MODEL_VERSION: &str = "facenet128";
/// Frames smaller than this on either side are too small to hold a usable face.
const MIN_FRAME_SIDE: u32 = 32;
/// Floor for the per-image standard deviation: 1/sqrt(160*160*3), as in
/// FaceNet prewhitening.
const MIN_STD: f32 = 1.0 / 277.128_13;

#[derive(Error, Debug)]
pub enum FacenetError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FaceNet-based [`Extractor`].
pub struct FacenetExtractor {
    session: Session,
}

impl FacenetExtractor {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, FacenetError> {
        if !Path::new(model_path).exists() {
            return Err(FacenetError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Run the model on a frame. Returns the raw (unnormalized) embedding.
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<f32>, FacenetError> {
        let input = Self::preprocess(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FacenetError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();
        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(FacenetError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }
        Ok(raw)
    }

    /// Resize to 160×160 and standardize per image into a NHWC float tensor.
    fn preprocess(frame: &RgbImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE as usize;
        let resized = imageops::resize(frame, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE, FilterType::Triangle);

        let samples: Vec<f32> = resized.as_raw().iter().map(|&v| f32::from(v)).collect();
        let n = samples.len() as f32;
        let mean = samples.iter().sum::<f32>() / n;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        let std = var.sqrt().max(MIN_STD);

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (f32::from(pixel.0[c]) - mean) / std;
            }
        }
        tensor
    }
}

impl Extractor for FacenetExtractor {
    fn extract(&mut self, image: &RgbImage) -> Extraction {
        if image.width() < MIN_FRAME_SIDE || image.height() < MIN_FRAME_SIDE {
            tracing::debug!(width = image.width(), height = image.height(), "frame too small");
            return Extraction::NoFace;
        }

        match self.infer(image) {
            Ok(values) => {
                let embedding = Embedding::new(values).with_model_version(FACENET_MODEL_VERSION);
                if !embedding.is_finite() || embedding.norm() == 0.0 {
                    tracing::debug!("degenerate embedding; treating as no face");
                    return Extraction::NoFace;
                }
                Extraction::Face(embedding)
            }
            Err(e) => {
                tracing::warn!(error = %e, "FaceNet inference failed");
                Extraction::Failed(e.to_string())
            }
        }
    }
}
