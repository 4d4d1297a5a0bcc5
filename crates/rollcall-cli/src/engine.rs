use image::RgbImage;
use rollcall_core::{
    build_index, register, BuildReport, Extraction, Extractor, IndexError, PhotoStore, Registration,
    RegistrationError, SharedIndex,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("index build failed: {0}")]
    Index(#[from] IndexError),
    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of a registration: the new embedding plus the rebuild it triggered.
pub struct RegisterResult {
    pub registration: Registration,
    pub report: BuildReport,
}

/// How long callers wait on the engine before giving up.
#[derive(Debug, Clone, Copy)]
pub struct EngineTimeouts {
    /// One frame through the extractor.
    pub extract: Duration,
    /// A registration or full index rebuild.
    pub rebuild: Duration,
}

/// Frame extraction, served by the scan lane.
struct ScanRequest {
    image: RgbImage,
    reply: oneshot::Sender<Extraction>,
}

/// Store-wide work, served by the build lane.
enum BuildRequest {
    Register {
        identity: String,
        reply: oneshot::Sender<Result<RegisterResult, EngineError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<BuildReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine threads.
///
/// Scans and builds run on separate OS threads, each owning its own
/// extractor, so a scan never queues behind a registration or rebuild. The
/// published index lives in a [`SharedIndex`] that callers read directly.
#[derive(Clone)]
pub struct EngineHandle {
    scan_tx: mpsc::Sender<ScanRequest>,
    build_tx: mpsc::Sender<BuildRequest>,
    index: Arc<SharedIndex>,
    timeouts: EngineTimeouts,
}

impl EngineHandle {
    /// The currently published index.
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Extract an embedding from one RGB frame.
    pub async fn extract(&self, image: RgbImage) -> Result<Extraction, EngineError> {
        request(&self.scan_tx, "extract", self.timeouts.extract, |reply| ScanRequest {
            image,
            reply,
        })
        .await
    }

    /// Aggregate the employee's photos into a new embedding, then rebuild
    /// and publish the index.
    pub async fn register(&self, identity: &str) -> Result<RegisterResult, EngineError> {
        let identity = identity.to_string();
        request(&self.build_tx, "register", self.timeouts.rebuild, |reply| {
            BuildRequest::Register { identity, reply }
        })
        .await?
    }

    /// Rebuild the index from the store and publish it.
    pub async fn rebuild(&self) -> Result<BuildReport, EngineError> {
        request(&self.build_tx, "rebuild", self.timeouts.rebuild, |reply| {
            BuildRequest::Rebuild { reply }
        })
        .await?
    }
}

async fn request<R, T>(
    tx: &mpsc::Sender<R>,
    operation: &'static str,
    timeout: Duration,
    make: impl FnOnce(oneshot::Sender<T>) -> R,
) -> Result<T, EngineError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let exchange = async {
        tx.send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| EngineError::Timeout { operation, timeout })?
}

/// Spawn the scan and build lanes on dedicated OS threads.
///
/// `scan_extractor` serves frame extraction only; `build_extractor` serves
/// registrations and rebuilds. The initial index is built and published
/// synchronously, so a broken store fails fast at startup.
pub fn spawn_engine<S, B>(
    scan_extractor: S,
    mut build_extractor: B,
    store: PhotoStore,
    timeouts: EngineTimeouts,
) -> Result<(EngineHandle, BuildReport), EngineError>
where
    S: Extractor + Send + 'static,
    B: Extractor + Send + 'static,
{
    let (initial, report) = build_index(&store, &mut build_extractor)?;
    let index = Arc::new(SharedIndex::new(initial));

    let (scan_tx, scan_rx) = mpsc::channel::<ScanRequest>(4);
    let (build_tx, build_rx) = mpsc::channel::<BuildRequest>(4);

    spawn_scan_lane(scan_extractor, scan_rx)?;
    spawn_build_lane(build_extractor, store, Arc::clone(&index), build_rx)?;

    let handle = EngineHandle {
        scan_tx,
        build_tx,
        index,
        timeouts,
    };
    Ok((handle, report))
}

fn spawn_scan_lane<E>(mut extractor: E, mut rx: mpsc::Receiver<ScanRequest>) -> std::io::Result<()>
where
    E: Extractor + Send + 'static,
{
    std::thread::Builder::new()
        .name("rollcall-scan".into())
        .spawn(move || {
            tracing::info!("scan lane started");
            while let Some(ScanRequest { image, reply }) = rx.blocking_recv() {
                let _ = reply.send(extractor.extract(&image));
            }
            tracing::info!("scan lane exiting");
        })?;
    Ok(())
}

fn spawn_build_lane<E>(
    mut extractor: E,
    store: PhotoStore,
    published: Arc<SharedIndex>,
    mut rx: mpsc::Receiver<BuildRequest>,
) -> std::io::Result<()>
where
    E: Extractor + Send + 'static,
{
    std::thread::Builder::new()
        .name("rollcall-build".into())
        .spawn(move || {
            tracing::info!("build lane started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    BuildRequest::Register { identity, reply } => {
                        let result = run_register(&store, &mut extractor, &published, &identity);
                        let _ = reply.send(result);
                    }
                    BuildRequest::Rebuild { reply } => {
                        let result = run_rebuild(&store, &mut extractor, &published);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("build lane exiting");
        })?;
    Ok(())
}

fn run_register<E: Extractor>(
    store: &PhotoStore,
    extractor: &mut E,
    published: &SharedIndex,
    identity: &str,
) -> Result<RegisterResult, EngineError> {
    let registration = register(store, extractor, identity)?;
    let report = run_rebuild(store, extractor, published)?;
    Ok(RegisterResult {
        registration,
        report,
    })
}

fn run_rebuild<E: Extractor>(
    store: &PhotoStore,
    extractor: &mut E,
    published: &SharedIndex,
) -> Result<BuildReport, EngineError> {
    let (index, report) = build_index(store, extractor)?;
    let previous = published.publish(index);
    tracing::info!(
        previous = previous.len(),
        current = report.indexed(),
        "index published"
    );
    Ok(report)
}
