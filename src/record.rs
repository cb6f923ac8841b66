//! Captured image record types

use serde::{Deserialize, Serialize};

/// A persisted captured image. The URL is the primary key; the store never
/// holds two records with the same URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedImage {
    /// Source URL, unique per record
    pub url: String,

    /// Origin tab the capture came from (informational only)
    pub tab_id: i64,

    /// Capture time, epoch milliseconds
    pub timestamp: i64,

    /// Original image bytes. Absent only if a capture failed after metadata
    /// was written, which the pipeline guards against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_data: Option<Vec<u8>>,

    /// Small raster preview as a data URI, derived lazily and cached back
    /// into the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_data: Option<String>,

    /// Pixel dimensions, reserved for future metadata; unset is valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Byte length of `full_data`, set at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl CapturedImage {
    /// Build a freshly captured record from fetched bytes
    pub fn new(url: String, tab_id: i64, timestamp: i64, data: Vec<u8>, thumbnail: String) -> Self {
        let file_size = data.len() as u64;
        Self {
            url,
            tab_id,
            timestamp,
            full_data: Some(data),
            thumbnail_data: Some(thumbnail),
            width: None,
            height: None,
            file_size: Some(file_size),
        }
    }

    /// Strip the blob, keeping only the fields list views need
    pub fn into_metadata(self) -> ImageMetadata {
        ImageMetadata {
            url: self.url,
            tab_id: self.tab_id,
            timestamp: self.timestamp,
            thumbnail_data: self.thumbnail_data,
            width: self.width,
            height: self.height,
            file_size: self.file_size,
        }
    }
}

/// The same record without `full_data`, for contexts that only render lists
/// and must not pull large blobs across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub url: String,
    pub tab_id: i64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_file_size() {
        let record = CapturedImage::new(
            "https://example.com/a.png".to_string(),
            7,
            1_700_000_000_000,
            vec![1, 2, 3, 4],
            "data:image/jpeg;base64,abcd".to_string(),
        );
        assert_eq!(record.file_size, Some(4));
        assert!(record.width.is_none());
        assert!(record.height.is_none());
    }

    #[test]
    fn test_metadata_drops_blob() {
        let record = CapturedImage::new(
            "https://example.com/a.png".to_string(),
            7,
            1,
            vec![0; 1024],
            "data:image/jpeg;base64,abcd".to_string(),
        );
        let meta = record.into_metadata();
        assert_eq!(meta.file_size, Some(1024));
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("full_data"));
    }
}
