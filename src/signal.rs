//! Capture signal sources
//!
//! Host adapters (network-load observers, DOM watchers) run outside the core
//! and feed candidate image signals through a channel. The core only sees
//! `ImageSignal` values; how they were observed is the adapter's business.

use crate::fetch::{has_image_extension, is_image_content_type};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// A candidate image observed by some host adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSignal {
    pub url: String,
    pub tab_id: i64,
}

/// A source of capture candidates the pipeline can subscribe to
pub trait SignalSource {
    /// Hand out the receiving end of this source's signal stream; None once
    /// it has already been taken
    fn subscribe(&mut self) -> Option<mpsc::Receiver<ImageSignal>>;
}

/// Channel-backed source for host adapters that push signals in
pub struct ChannelSignalSource {
    tx: mpsc::Sender<ImageSignal>,
    rx: Option<mpsc::Receiver<ImageSignal>>,
}

impl ChannelSignalSource {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self { tx, rx: Some(rx) }
    }

    /// Sender half for the host adapter
    pub fn sender(&self) -> mpsc::Sender<ImageSignal> {
        self.tx.clone()
    }
}

impl SignalSource for ChannelSignalSource {
    fn subscribe(&mut self) -> Option<mpsc::Receiver<ImageSignal>> {
        self.rx.take()
    }
}

/// Whether an observed resource load should become a capture candidate,
/// judged by declared content type or, as a fallback, URL extension
pub fn is_candidate(url: &str, content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) if !ct.is_empty() => is_image_content_type(ct),
        _ => has_image_extension(url),
    }
}

/// Best-effort per-context dedup of observed URLs.
///
/// This sits upstream of the store lookup and only exists to avoid
/// re-submitting signals a context has already seen; the store query in the
/// pipeline remains the authoritative dedup. Bounded so a long-lived
/// observation context cannot grow it without limit.
pub struct SeenUrls {
    seen: HashSet<String>,
    max_entries: usize,
}

impl SeenUrls {
    pub fn new(max_entries: usize) -> Self {
        Self {
            seen: HashSet::new(),
            max_entries,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(10_000)
    }

    /// Record a URL; returns false if it was already seen
    pub fn insert(&mut self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        if self.seen.len() >= self.max_entries {
            self.seen.clear();
        }
        self.seen.insert(url.to_string());
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
