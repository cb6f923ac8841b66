//! Capture pipeline: candidate signal to persisted record
//!
//! Both observation paths (network loads and DOM watching) funnel into
//! `capture`, which dedups against the store, fetches the bytes, derives a
//! thumbnail, persists the record, and announces it.

use crate::badge::{BadgeSink, BadgeState};
use crate::fetch::{looks_like_image, ResourceFetcher};
use crate::protocol::CoreEvent;
use crate::record::CapturedImage;
use crate::signal::ImageSignal;
use crate::store::{ImageStore, StoreError};
use crate::thumbnail;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// What a single capture attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new record was persisted
    Captured,
    /// The URL was already stored; nothing done
    Duplicate,
    /// Fetch failed or the payload was not an image; silently abandoned
    Skipped,
}

pub struct CapturePipeline {
    store: Arc<Mutex<ImageStore>>,
    fetcher: Arc<dyn ResourceFetcher>,
    badge: Arc<dyn BadgeSink>,
    events: broadcast::Sender<CoreEvent>,
}

impl CapturePipeline {
    pub fn new(
        store: Arc<Mutex<ImageStore>>,
        fetcher: Arc<dyn ResourceFetcher>,
        badge: Arc<dyn BadgeSink>,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            store,
            fetcher,
            badge,
            events,
        }
    }

    /// Consume signals from a source until its channel closes
    pub async fn run(&self, mut signals: mpsc::Receiver<ImageSignal>) {
        while let Some(signal) = signals.recv().await {
            if let Err(e) = self.capture(&signal.url, signal.tab_id).await {
                error!(url = %signal.url, "capture store failure: {}", e);
            }
        }
        debug!("signal source closed, capture loop ending");
    }

    /// Capture one candidate URL.
    ///
    /// Fetch failures and non-image payloads are logged and abandoned; only
    /// store failures surface to the caller. There is no lock between the
    /// existence check and the write: two concurrent captures of the same new
    /// URL may both fetch, but `put` is an upsert so the final state is still
    /// one record per URL. Accepted as rare and benign.
    pub async fn capture(&self, url: &str, tab_id: i64) -> Result<CaptureOutcome, StoreError> {
        if self.store.lock().await.get(url)?.is_some() {
            debug!(url, "already captured, skipping");
            return Ok(CaptureOutcome::Duplicate);
        }

        let resource = match self.fetcher.fetch(url).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(url, "fetch failed, abandoning capture: {}", e);
                return Ok(CaptureOutcome::Skipped);
            }
        };

        if !looks_like_image(&resource, url) {
            debug!(
                url,
                content_type = resource.content_type.as_deref().unwrap_or("-"),
                "payload is not an image, discarding"
            );
            return Ok(CaptureOutcome::Skipped);
        }

        let thumb = thumbnail::derive_default(&resource.bytes, resource.content_type.as_deref());
        let timestamp = chrono::Utc::now().timestamp_millis();
        let record = CapturedImage::new(url.to_string(), tab_id, timestamp, resource.bytes, thumb);

        let count = {
            let store = self.store.lock().await;
            store.put(&record)?;
            store.count()?
        };

        info!(url, tab_id, size = record.file_size, "image captured");

        // Lightweight announcement only; the bytes never cross this channel
        let _ = self.events.send(CoreEvent::ImageCaptured {
            url: record.url,
            tab_id,
            timestamp,
        });
        self.badge.update(BadgeState::Count { count });

        Ok(CaptureOutcome::Captured)
    }

    /// Cached thumbnail for a stored record, deriving and persisting it on
    /// first request. Returns None for an unknown URL.
    pub async fn thumbnail_for(&self, url: &str) -> Result<Option<String>, StoreError> {
        let store = self.store.lock().await;

        let record = match store.get(url)? {
            Some(record) => record,
            None => return Ok(None),
        };

        if let Some(existing) = record.thumbnail_data {
            return Ok(Some(existing));
        }

        // Missing blobs should not occur in steady state; derive from empty
        // bytes yields the placeholder rather than failing.
        let bytes = record.full_data.unwrap_or_default();
        let thumb = thumbnail::derive_default(&bytes, None);
        store.set_thumbnail(url, &thumb)?;
        Ok(Some(thumb))
    }

    /// Delete every record and refresh the badge
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let store = self.store.lock().await;
        store.clear()?;
        drop(store);
        info!("all captured images cleared");
        self.refresh_badge().await;
        Ok(())
    }

    /// Delete one record by URL; returns whether it existed
    pub async fn delete_one(&self, url: &str) -> Result<bool, StoreError> {
        let existed = self.store.lock().await.delete(url)?;
        if existed {
            info!(url, "captured image deleted");
        }
        self.refresh_badge().await;
        Ok(existed)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.lock().await.count()
    }

    pub async fn list_metadata(&self) -> Result<Vec<crate::record::ImageMetadata>, StoreError> {
        self.store.lock().await.get_all_metadata()
    }

    async fn refresh_badge(&self) {
        match self.store.lock().await.count() {
            Ok(count) => self.badge.update(BadgeState::Count { count }),
            Err(e) => warn!("badge refresh failed: {}", e),
        }
    }
}
