//! Image Vault Library
//!
//! Captures images observed during browsing sessions, deduplicates and
//! persists them, and exports the collection as downloadable zip archives
//! with progress feedback. Designed to sit behind a thin UI layer that talks
//! to it over a small message protocol.

pub mod badge;
pub mod capture;
pub mod export;
pub mod fetch;
pub mod protocol;
pub mod record;
pub mod server;
pub mod signal;
pub mod store;
pub mod thumbnail;

pub use capture::{CaptureOutcome, CapturePipeline};
pub use export::{Archive, Exporter, ExporterConfig};
pub use record::{CapturedImage, ImageMetadata};
pub use server::{ServerConfig, VaultServer};
pub use store::ImageStore;
