//! Unix socket server exposing the capture core to UI collaborators
//!
//! One JSON request per line, one JSON response per request; core events
//! (captures, export progress) are pushed to every connected client as
//! additional JSON lines.

use crate::badge::{BadgeSink, LogBadge};
use crate::capture::CapturePipeline;
use crate::export::{Exporter, ExporterConfig, FileDelivery};
use crate::fetch::HttpFetcher;
use crate::protocol::{CommandResponse, CoreEvent, Request};
use crate::store::ImageStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

/// Vault server configuration
pub struct ServerConfig {
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Directory finished archives are delivered into
    pub export_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("image-vault");
        let export_dir = dirs::download_dir().unwrap_or_else(|| data_dir.join("exports"));

        Self {
            socket_path: PathBuf::from("/tmp/image-vault.sock"),
            db_path: data_dir.join("images.db"),
            export_dir,
        }
    }
}

/// Image vault server that listens on a Unix socket
pub struct VaultServer {
    config: ServerConfig,
    pipeline: Arc<CapturePipeline>,
    exporter: Arc<Exporter>,
    events: broadcast::Sender<CoreEvent>,
}

impl VaultServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Arc::new(Mutex::new(ImageStore::open(&config.db_path)?));
        let badge: Arc<dyn BadgeSink> = Arc::new(LogBadge);
        let (events, _) = broadcast::channel(256);

        let pipeline = Arc::new(CapturePipeline::new(
            Arc::clone(&store),
            Arc::new(HttpFetcher::new()),
            Arc::clone(&badge),
            events.clone(),
        ));

        let exporter = Arc::new(Exporter::new(
            store,
            Arc::new(FileDelivery::new(config.export_dir.clone())),
            badge,
            events.clone(),
            ExporterConfig::default(),
        ));

        Ok(Self {
            config,
            pipeline,
            exporter,
            events,
        })
    }

    /// Create a server with default configuration
    pub fn with_defaults() -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(ServerConfig::default())
    }

    /// Start the server and listen for connections
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("image vault listening on {:?}", self.config.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let pipeline = Arc::clone(&self.pipeline);
                    let exporter = Arc::clone(&self.exporter);
                    let events = self.events.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, pipeline, exporter, events).await
                        {
                            error!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Process a single request (for direct integration without a socket)
    pub async fn process(&self, request: Request) -> CommandResponse {
        handle_request(&self.pipeline, &self.exporter, request).await
    }
}

/// Handle one client: one response line per request line, with core events
/// pushed onto the same stream.
///
/// A single writer task owns the socket's write half; responses and
/// forwarded events are funneled through a channel so a pushed event can
/// never interleave with a partially read request.
async fn handle_connection(
    stream: UnixStream,
    pipeline: Arc<CapturePipeline>,
    exporter: Arc<Exporter>,
    mut events: broadcast::Receiver<CoreEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        while let Some(json) = out_rx.recv().await {
            if writer.write_all(json.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    let event_tx = out_tx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if event_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "client lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(&pipeline, &exporter, request).await,
            Err(e) => {
                warn!("failed to parse request: {}", e);
                CommandResponse::error(&format!("parse error: {}", e))
            }
        };

        let json = serde_json::to_string(&response)?;
        if out_tx.send(json).await.is_err() {
            break;
        }

        line.clear();
    }

    event_task.abort();
    drop(out_tx);
    let _ = writer_task.await;

    Ok(())
}

/// Dispatch one request. Every arm resolves to a success/failure shaped
/// response; nothing panics across this boundary.
async fn handle_request(
    pipeline: &Arc<CapturePipeline>,
    exporter: &Arc<Exporter>,
    request: Request,
) -> CommandResponse {
    match request {
        Request::CaptureCandidate { url, tab_id } => {
            // Fire-and-forget: the capture proceeds after the ack, and its
            // outcome is announced through the event stream
            let pipeline = Arc::clone(pipeline);
            tokio::spawn(async move {
                if let Err(e) = pipeline.capture(&url, tab_id).await {
                    error!(url = %url, "capture failed: {}", e);
                }
            });
            CommandResponse::acked("capture queued")
        }

        Request::ClearAll => match pipeline.clear_all().await {
            Ok(()) => CommandResponse::ok(),
            Err(e) => {
                error!("clear failed: {}", e);
                CommandResponse::error(&format!("store error: {}", e))
            }
        },

        Request::DeleteOne { url } => match pipeline.delete_one(&url).await {
            Ok(true) => CommandResponse::ok(),
            Ok(false) => CommandResponse::error("no such image"),
            Err(e) => {
                error!(url = %url, "delete failed: {}", e);
                CommandResponse::error(&format!("store error: {}", e))
            }
        },

        Request::StartExport => {
            if exporter.is_exporting() {
                return CommandResponse::error("export already running");
            }
            // Completion or failure arrives as an export-complete /
            // export-error event; the response only acknowledges the start
            let exporter = Arc::clone(exporter);
            tokio::spawn(async move {
                let _ = exporter.run().await;
            });
            CommandResponse::acked("export started")
        }

        Request::ListImages => match pipeline.list_metadata().await {
            Ok(images) => CommandResponse::images(images),
            Err(e) => CommandResponse::error(&format!("store error: {}", e)),
        },

        Request::Count => match pipeline.count().await {
            Ok(count) => CommandResponse::count(count),
            Err(e) => CommandResponse::error(&format!("store error: {}", e)),
        },

        Request::GetThumbnail { url } => match pipeline.thumbnail_for(&url).await {
            Ok(Some(thumb)) => CommandResponse::thumbnail(thumb),
            Ok(None) => CommandResponse::error("no such image"),
            Err(e) => CommandResponse::error(&format!("store error: {}", e)),
        },
    }
}
