use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::{EmbeddingStore, FacenetExtractor, PhotoStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod engine;
mod kiosk;
mod service;
#[cfg(test)]
mod testing;

use attendance::{AttendanceLog, Mode};
use config::Config;
use engine::{spawn_engine, EngineTimeouts};
use service::AttendanceService;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the face index from the photo store and report coverage
    Index,
    /// Register an employee from the photos in their folder
    Register {
        /// Employee ID (name of the photo folder)
        employee: String,
    },
    /// Match a captured frame and record attendance
    Scan {
        /// Image file holding the captured frame
        image: PathBuf,
        /// Check-in or check-out
        #[arg(short, long, value_enum, default_value_t = Mode::In)]
        mode: Mode,
        /// Camera name recorded with the entry (overrides ROLLCALL_CAMERA)
        #[arg(long)]
        camera: Option<String>,
        /// Similarity threshold (overrides ROLLCALL_SIMILARITY_THRESHOLD)
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Serve scan/register/rebuild commands read line by line from stdin
    Kiosk {
        /// Mode used when a scan line does not name one
        #[arg(short, long, value_enum, default_value_t = Mode::In)]
        mode: Mode,
    },
    /// List attendance records for a day
    Log {
        /// Day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show configuration and gallery status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Index => {
            let (engine, report) = start_engine(&config)?;
            println!(
                "{}",
                json!({
                    "indexed": engine.index().snapshot().len(),
                    "loaded": report.loaded,
                    "computed": report.computed,
                    "missing": report.missing,
                })
            );
        }
        Commands::Register { employee } => {
            let service = start_service(&config)?;
            let result = service.register(&employee).await?;
            println!(
                "{}",
                json!({
                    "employee": employee,
                    "used": result.registration.used,
                    "skipped": result.registration.skipped,
                    "indexed": result.report.indexed(),
                    "missing": result.report.missing,
                })
            );
        }
        Commands::Scan {
            image,
            mode,
            camera,
            threshold,
        } => {
            let mut service = start_service(&config)?;
            if let Some(camera) = camera {
                service = service.with_camera(camera);
            }
            if let Some(threshold) = threshold {
                service = service.with_threshold(threshold);
            }
            let outcome = service.scan_file(&image, mode).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Kiosk { mode } => {
            let service = Arc::new(start_service(&config)?);
            kiosk::run(service, mode).await?;
        }
        Commands::Log { date } => {
            let log = AttendanceLog::open(&config.db_path)?;
            let day = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let records = log.on_date(day)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Status => {
            let store = PhotoStore::new(&config.photos_dir);
            let (employees, embeddings) = gallery_counts(&store)?;
            println!(
                "{}",
                json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "photos_dir": config.photos_dir,
                    "employees": employees,
                    "embeddings": embeddings,
                    "model": config.model_path,
                    "model_present": config.model_path.exists(),
                    "db_path": config.db_path,
                    "similarity_threshold": config.similarity_threshold,
                    "camera": config.camera,
                })
            );
        }
    }

    Ok(())
}

/// Load the FaceNet model and start the engine over the configured store.
fn start_engine(config: &Config) -> Result<(engine::EngineHandle, rollcall_core::BuildReport)> {
    // One session per lane: scans must not wait behind a rebuild.
    let scan_extractor = load_extractor(config)?;
    let build_extractor = load_extractor(config)?;
    tracing::info!(path = %config.model_path.display(), "FaceNet extractors loaded");

    let timeouts = EngineTimeouts {
        extract: config.extract_timeout(),
        rebuild: config.rebuild_timeout(),
    };
    let (engine, report) = spawn_engine(
        scan_extractor,
        build_extractor,
        PhotoStore::new(&config.photos_dir),
        timeouts,
    )
    .with_context(|| format!("building index from {}", config.photos_dir.display()))?;
    Ok((engine, report))
}

fn load_extractor(config: &Config) -> Result<FacenetExtractor> {
    FacenetExtractor::load(&config.model_path_str())
        .with_context(|| format!("loading model {}", config.model_path.display()))
}

/// Employees in the store, and how many of them have a saved embedding.
fn gallery_counts(store: &PhotoStore) -> Result<(usize, usize)> {
    let identities = store
        .identities()
        .with_context(|| format!("listing employees in {}", store.root().display()))?;
    let mut with_embedding = 0;
    for id in &identities {
        let stored = store
            .load(id)
            .with_context(|| format!("reading embedding for {id}"))?;
        if stored.is_some() {
            with_embedding += 1;
        }
    }
    Ok((identities.len(), with_embedding))
}

fn start_service(config: &Config) -> Result<AttendanceService> {
    let (engine, _) = start_engine(config)?;
    let log = AttendanceLog::open(&config.db_path)?;
    Ok(AttendanceService::new(
        engine,
        config.similarity_threshold,
        config.camera.clone(),
        Some(log),
    ))
}
