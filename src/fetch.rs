//! Resource fetching boundary
//!
//! The capture pipeline pulls bytes through the `ResourceFetcher` trait so
//! tests can substitute canned payloads for real network access.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("request failed with status {0}")]
    Status(u16),
}

/// A fetched resource: the raw bytes plus the declared content type, if the
/// server sent one
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Abstraction over the host's resource-loading capability
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError>;
}

/// reqwest-backed fetcher used in production
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?
            .to_vec();

        Ok(FetchedResource { bytes, content_type })
    }
}

/// File extensions accepted as image URLs when no content type is available
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico", "avif",
];

/// Whether a declared content type marks an image payload (the vector type
/// included)
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Whether the URL path ends in a known image extension
pub fn has_image_extension(raw_url: &str) -> bool {
    let path = match url::Url::parse(raw_url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw_url.to_string(),
    };

    path.rsplit('.')
        .next()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validate a fetched payload as an image: by declared type when present,
/// by URL extension otherwise
pub fn looks_like_image(resource: &FetchedResource, url: &str) -> bool {
    match resource.content_type.as_deref() {
        Some(ct) => is_image_content_type(ct),
        None => has_image_extension(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_content_types() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("image/svg+xml"));
        assert!(is_image_content_type("IMAGE/JPEG"));
        assert!(is_image_content_type(" image/webp"));
        assert!(!is_image_content_type("text/html"));
        assert!(!is_image_content_type("application/json"));
    }

    #[test]
    fn test_image_extensions() {
        assert!(has_image_extension("https://x/a.png"));
        assert!(has_image_extension("https://x/a.JPG?w=100"));
        assert!(has_image_extension("https://x/path/to/pic.webp#frag"));
        assert!(!has_image_extension("https://x/page.html"));
        assert!(!has_image_extension("https://x/noext"));
    }

    #[test]
    fn test_looks_like_image_prefers_declared_type() {
        let html = FetchedResource {
            bytes: vec![],
            content_type: Some("text/html".to_string()),
        };
        // Declared type wins even when the URL looks like an image
        assert!(!looks_like_image(&html, "https://x/a.png"));

        let untyped = FetchedResource {
            bytes: vec![],
            content_type: None,
        };
        assert!(looks_like_image(&untyped, "https://x/a.png"));
        assert!(!looks_like_image(&untyped, "https://x/a"));
    }
}
