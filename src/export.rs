//! Archive export: package all captured images into zip archives
//!
//! Records are read in full, partitioned into bounded chunks, and each chunk
//! is packaged sequentially into one archive with fractional progress
//! reported across the whole run. Image bytes go in with no recompression.
//! A single-flight guard rejects a second export while one is in flight.

use crate::badge::{BadgeSink, BadgeState};
use crate::protocol::CoreEvent;
use crate::record::CapturedImage;
use crate::store::{ImageStore, StoreError};
use crate::thumbnail::is_vector;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Upper bound on records per archive. Large enough that ordinary
/// collections produce a single archive; it only bounds worst-case archive
/// size for very large collections.
pub const DEFAULT_CHUNK_CEILING: usize = 1000;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("an export is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("archive serialization failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive serialization failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("delivery interrupted: {0}")]
    Delivery(String),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("delivery interrupted: {0}")]
    Interrupted(String),
}

/// One finished archive ready for delivery
#[derive(Debug, Clone)]
pub struct Archive {
    pub name: String,
    pub bytes: Vec<u8>,
    pub record_count: usize,
}

/// Receives the overall export percentage, 0-100, monotone nondecreasing
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

/// The external capability that turns a finished archive into a saved file
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<(), DeliveryError>;
}

/// Delivery sink that writes archives into a directory
pub struct FileDelivery {
    dir: PathBuf,
}

impl FileDelivery {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl DeliverySink for FileDelivery {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<(), DeliveryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), "archive delivered");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Maximum records per archive
    pub chunk_ceiling: usize,
    /// How long the final "done" badge state stays visible before reverting
    /// to the record count
    pub quiesce: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            chunk_ceiling: DEFAULT_CHUNK_CEILING,
            quiesce: Duration::from_secs(2),
        }
    }
}

pub struct Exporter {
    store: Arc<Mutex<ImageStore>>,
    delivery: Arc<dyn DeliverySink>,
    badge: Arc<dyn BadgeSink>,
    events: broadcast::Sender<CoreEvent>,
    config: ExporterConfig,
    exporting: AtomicBool,
}

/// Releases the single-flight flag however the export ends
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Exporter {
    pub fn new(
        store: Arc<Mutex<ImageStore>>,
        delivery: Arc<dyn DeliverySink>,
        badge: Arc<dyn BadgeSink>,
        events: broadcast::Sender<CoreEvent>,
        config: ExporterConfig,
    ) -> Self {
        Self {
            store,
            delivery,
            badge,
            events,
            config,
            exporting: AtomicBool::new(false),
        }
    }

    /// Whether an export is currently in flight
    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::SeqCst)
    }

    /// Run a full export: package, deliver each archive sequentially, and
    /// announce completion. A concurrent call is rejected immediately, never
    /// queued.
    pub async fn run(&self) -> Result<usize, ExportError> {
        // Check-and-set kept adjacent: the flag is a single global toggle
        if self
            .exporting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::AlreadyRunning);
        }
        let _guard = FlightGuard(&self.exporting);

        match self.run_inner().await {
            Ok(delivered) => {
                let message = if delivered == 0 {
                    "no images to export".to_string()
                } else {
                    format!("exported {} archive(s)", delivered)
                };
                info!(archives = delivered, "export complete");
                let _ = self.events.send(CoreEvent::ExportComplete {
                    success: true,
                    message,
                });
                self.settle_badge().await;
                Ok(delivered)
            }
            Err(e) => {
                warn!("export failed: {}", e);
                let _ = self.events.send(CoreEvent::ExportError {
                    message: e.to_string(),
                });
                self.badge.update(BadgeState::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> Result<usize, ExportError> {
        let progress = EventProgress {
            events: self.events.clone(),
            badge: Arc::clone(&self.badge),
        };

        let archives = self.export_all(&progress).await?;

        for archive in &archives {
            self.delivery
                .deliver(&archive.name, &archive.bytes)
                .await
                .map_err(|e| ExportError::Delivery(e.to_string()))?;
        }

        Ok(archives.len())
    }

    /// Read all records and package them into archives, reporting overall
    /// progress. An empty store produces zero archives and is not an error.
    /// A serialization failure for any chunk aborts the whole export.
    pub async fn export_all(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Archive>, ExportError> {
        let records = self.store.lock().await.get_all()?;
        if records.is_empty() {
            info!("nothing to export");
            return Ok(Vec::new());
        }

        let chunks: Vec<&[CapturedImage]> = records.chunks(self.config.chunk_ceiling).collect();
        let total_chunks = chunks.len();
        let date = chrono::Utc::now().format("%Y-%m-%d");

        info!(
            records = records.len(),
            chunks = total_chunks,
            "starting export"
        );

        let mut archives = Vec::with_capacity(total_chunks);
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let name = if total_chunks == 1 {
                format!("captured-images-{}.zip", date)
            } else {
                format!("captured-images-{}-part-{}.zip", date, chunk_idx + 1)
            };

            let bytes = build_archive(chunk, |local| {
                progress.report(overall_percent(chunk_idx, local, total_chunks));
            })?;

            progress.report(overall_percent(chunk_idx, 100, total_chunks));
            archives.push(Archive {
                name,
                bytes,
                record_count: chunk.len(),
            });

            // Chunks are strictly sequential; yield between them so a long
            // export does not starve the event loop
            tokio::task::yield_now().await;
        }

        Ok(archives)
    }

    /// Show the final state briefly, then fall back to the record count
    async fn settle_badge(&self) {
        tokio::time::sleep(self.config.quiesce).await;
        match self.store.lock().await.count() {
            Ok(count) => self.badge.update(BadgeState::Count { count }),
            Err(e) => warn!("badge refresh failed after export: {}", e),
        }
    }
}

/// Progress sink wired to the event channel and badge
struct EventProgress {
    events: broadcast::Sender<CoreEvent>,
    badge: Arc<dyn BadgeSink>,
}

impl ProgressSink for EventProgress {
    fn report(&self, percent: u8) {
        let _ = self.events.send(CoreEvent::ExportProgress { percent });
        self.badge.update(BadgeState::Progress { percent });
    }
}

/// Combine a chunk-local percentage into the overall run percentage
fn overall_percent(chunk_idx: usize, local: u32, total_chunks: usize) -> u8 {
    let overall = (chunk_idx as u32 * 100 + local) as f64 / total_chunks as f64;
    overall.round().min(100.0) as u8
}

/// Package one chunk of records into an in-memory zip.
///
/// Entries are stored uncompressed - the images are already compressed and
/// recompressing wastes time. `local_progress` receives chunk-local
/// percentages (0-100).
fn build_archive(
    records: &[CapturedImage],
    mut local_progress: impl FnMut(u32),
) -> Result<Vec<u8>, ExportError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut used_names = HashSet::new();
    let total = records.len() as u32;

    for (position, record) in records.iter().enumerate() {
        let bytes = match record.full_data.as_deref() {
            Some(bytes) => bytes,
            None => {
                // Should not occur in steady state; keep the entry so the
                // archive still accounts for every record
                warn!(url = %record.url, "record has no image bytes, writing empty entry");
                &[]
            }
        };

        let name = unique_entry_name(record, position, bytes, &mut used_names);
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;

        // Coarse insertion progress; finalization bumps the chunk to 100
        local_progress((position as u32 + 1) * 90 / total);
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Pick an archive-unique filename for a record. Collisions are resolved by
/// suffixing an incrementing counter plus the record's position in the chunk.
fn unique_entry_name(
    record: &CapturedImage,
    position: usize,
    bytes: &[u8],
    used: &mut HashSet<String>,
) -> String {
    let stem = sanitize_stem(&record.url);
    let ext = entry_extension(bytes, &record.url);

    let mut name = format!("{}.{}", stem, ext);
    let mut counter = 1;
    while !used.insert(name.clone()) {
        name = format!("{}-{}-{}.{}", stem, counter, position, ext);
        counter += 1;
    }
    name
}

/// Base filename from the last URL path segment, reduced to safe characters
fn sanitize_stem(raw_url: &str) -> String {
    let path = url::Url::parse(raw_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw_url.to_string());

    let segment = path.rsplit('/').next().unwrap_or("");
    let base = segment.rsplit_once('.').map_or(segment, |(stem, _)| stem);

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// Extension from the stored bytes (the record's own content), falling back
/// to the URL extension, then a default
fn entry_extension(bytes: &[u8], raw_url: &str) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        use image::ImageFormat::*;
        let ext = match format {
            Png => "png",
            Jpeg => "jpg",
            Gif => "gif",
            WebP => "webp",
            Bmp => "bmp",
            Ico => "ico",
            Avif => "avif",
            Tiff => "tif",
            other => return other.extensions_str().first().copied().unwrap_or("jpg").to_string(),
        };
        return ext.to_string();
    }

    if is_vector(bytes, None) {
        return "svg".to_string();
    }

    let path = url::Url::parse(raw_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw_url.to_string());
    if let Some((_, ext)) = path.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_ascii_lowercase();
        }
    }

    "jpg".to_string()
}
