use crate::attendance::{AttendanceLog, Mode};
use crate::engine::{EngineHandle, RegisterResult};
use anyhow::{Context, Result};
use image::RgbImage;
use rollcall_core::{BuildReport, CosineMatcher, Extraction, Matcher};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

/// What one attendance scan came to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Recognized and recorded.
    Matched { employee: String, confidence: f32 },
    /// A face was found but no employee cleared the threshold.
    Unknown { confidence: f32 },
    NoFace,
    /// The extractor could not process the frame.
    Failed { reason: String },
}

/// Scan and registration front end over the engine, the published index and
/// the attendance log.
pub struct AttendanceService {
    engine: EngineHandle,
    threshold: f32,
    camera: String,
    log: Option<Mutex<AttendanceLog>>,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, threshold: f32, camera: String, log: Option<AttendanceLog>) -> Self {
        Self {
            engine,
            threshold,
            camera,
            log: log.map(Mutex::new),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_camera(mut self, camera: String) -> Self {
        self.camera = camera;
        self
    }

    /// Decode an image file and scan it.
    pub async fn scan_file(&self, path: &Path, mode: Mode) -> Result<ScanOutcome> {
        let frame = image::open(path)
            .with_context(|| format!("invalid image {}", path.display()))?
            .to_rgb8();
        self.scan(frame, mode).await
    }

    /// Match one RGB frame against the current index and record a hit.
    pub async fn scan(&self, frame: RgbImage, mode: Mode) -> Result<ScanOutcome> {
        let embedding = match self.engine.extract(frame).await? {
            Extraction::Face(embedding) => embedding,
            Extraction::NoFace => return Ok(ScanOutcome::NoFace),
            Extraction::Failed(reason) => return Ok(ScanOutcome::Failed { reason }),
        };

        let index = self.engine.index().snapshot();
        let result = CosineMatcher.compare(&embedding, &index, self.threshold);
        tracing::info!(
            employee = ?result.identity,
            similarity = result.similarity,
            threshold = self.threshold,
            gallery = index.len(),
            "scan matched"
        );

        let Some(employee) = result.identity else {
            return Ok(ScanOutcome::Unknown {
                confidence: result.similarity,
            });
        };

        if let Some(log) = &self.log {
            let now = chrono::Local::now().naive_local();
            let log = log.lock().unwrap_or_else(|e| e.into_inner());
            log.record(&employee, mode, &self.camera, result.similarity, now)
                .context("recording attendance")?;
        }

        Ok(ScanOutcome::Matched {
            employee,
            confidence: result.similarity,
        })
    }

    pub async fn register(&self, employee: &str) -> Result<RegisterResult> {
        Ok(self.engine.register(employee).await?)
    }

    pub async fn rebuild(&self) -> Result<BuildReport> {
        Ok(self.engine.rebuild().await?)
    }

    /// Number of employees in the published index.
    pub fn indexed(&self) -> usize {
        self.engine.index().snapshot().len()
    }
}
