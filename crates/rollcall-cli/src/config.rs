use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration: defaults, then an optional TOML file named by
/// `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-employee photo folders.
    pub photos_dir: PathBuf,
    /// FaceNet ONNX model file.
    pub model_path: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Timeout in seconds for a single-frame extraction.
    pub extract_timeout_secs: u64,
    /// Timeout in seconds for a registration or index rebuild.
    pub rebuild_timeout_secs: u64,
    /// Camera name recorded with each attendance entry.
    pub camera: String,
}

/// Keys accepted in the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    photos_dir: Option<PathBuf>,
    model_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    extract_timeout_secs: Option<u64>,
    rebuild_timeout_secs: Option<u64>,
    camera: Option<String>,
}

impl Config {
    /// Defaults rooted at `$XDG_DATA_HOME/rollcall` (or `~/.local/share/rollcall`).
    pub fn defaults() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            photos_dir: data_dir.join("photos"),
            model_path: data_dir.join("models/facenet128.onnx"),
            db_path: data_dir.join("attendance.db"),
            similarity_threshold: 0.75,
            extract_timeout_secs: 10,
            rebuild_timeout_secs: 300,
            camera: "entrance".to_string(),
        }
    }

    /// Load the layered configuration.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::defaults();
        if let Ok(path) = std::env::var("ROLLCALL_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        self.apply_toml(&text)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    }

    fn apply_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.photos_dir {
            self.photos_dir = v;
        }
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = file.extract_timeout_secs {
            self.extract_timeout_secs = v;
        }
        if let Some(v) = file.rebuild_timeout_secs {
            self.rebuild_timeout_secs = v;
        }
        if let Some(v) = file.camera {
            self.camera = v;
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_PHOTOS_DIR") {
            self.photos_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_CAMERA") {
            self.camera = v;
        }
        self.similarity_threshold = env_f32("ROLLCALL_SIMILARITY_THRESHOLD", self.similarity_threshold);
        self.extract_timeout_secs = env_u64("ROLLCALL_EXTRACT_TIMEOUT_SECS", self.extract_timeout_secs);
        self.rebuild_timeout_secs = env_u64("ROLLCALL_REBUILD_TIMEOUT_SECS", self.rebuild_timeout_secs);
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_timeout_secs)
    }

    /// Model path as the `&str` the ONNX loader takes.
    pub fn model_path_str(&self) -> String {
        self.model_path.to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
