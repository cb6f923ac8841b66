//! Message protocol between the core and its UI collaborators
//!
//! Requests arrive as JSON lines; each resolves to exactly one
//! `CommandResponse`. Long-running work additionally pushes `CoreEvent`s.
//! Nothing crosses this boundary as a panic or an unshaped error.

use crate::record::ImageMetadata;
use serde::{Deserialize, Serialize};

/// Request sent by a UI or content-script collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    /// A candidate image observed in a page; fire-and-forget
    CaptureCandidate { url: String, tab_id: i64 },
    /// Delete every stored record
    ClearAll,
    /// Delete one record by URL
    DeleteOne { url: String },
    /// Begin a full export; rejected if one is already running
    StartExport,
    /// Metadata-only listing for display
    ListImages,
    /// Current record count
    Count,
    /// Cached thumbnail for one record, deriving it on first request
    GetThumbnail { url: String },
}

/// Response to a single request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            count: None,
            images: None,
            thumbnail: None,
        }
    }

    pub fn acked(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::ok()
        }
    }

    pub fn count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Self::ok()
        }
    }

    pub fn images(images: Vec<ImageMetadata>) -> Self {
        Self {
            images: Some(images),
            ..Self::ok()
        }
    }

    pub fn thumbnail(data_uri: String) -> Self {
        Self {
            thumbnail: Some(data_uri),
            ..Self::ok()
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.to_string()),
            count: None,
            images: None,
            thumbnail: None,
        }
    }
}

/// Event pushed from the core to listening collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum CoreEvent {
    /// A new record was persisted. Deliberately lightweight: never carries
    /// the image bytes.
    ImageCaptured {
        url: String,
        tab_id: i64,
        timestamp: i64,
    },
    /// Overall export progress, 0-100 across all chunks
    ExportProgress { percent: u8 },
    /// Export finished
    ExportComplete { success: bool, message: String },
    /// Export aborted
    ExportError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = r#"{"type":"capture-candidate","url":"https://x/a.png","tab_id":7}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match request {
            Request::CaptureCandidate { url, tab_id } => {
                assert_eq!(url, "https://x/a.png");
                assert_eq!(tab_id, 7);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let json = r#"{"type":"start-export"}"#;
        assert!(matches!(
            serde_json::from_str::<Request>(json).unwrap(),
            Request::StartExport
        ));
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_string(&CommandResponse::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);

        let json = serde_json::to_string(&CommandResponse::error("boom")).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"boom"}"#);
    }

    #[test]
    fn test_captured_event_is_lightweight() {
        let event = CoreEvent::ImageCaptured {
            url: "https://x/a.png".to_string(),
            tab_id: 7,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"image-captured""#));
        assert!(!json.contains("full_data"));
    }
}
