//! Thumbnail derivation: arbitrary image bytes to a small raster data URI
//!
//! Derivation is total - every input, including garbage bytes, produces some
//! data URI. Failures fall through a chain: direct raster decode, vector
//! markup passthrough, and finally a fixed placeholder square.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, RgbImage};
use tracing::debug;

/// Default bounding box for derived thumbnails
pub const MAX_THUMB_WIDTH: u32 = 50;
pub const MAX_THUMB_HEIGHT: u32 = 50;

/// JPEG quality for thumbnail encoding (0-100)
const THUMB_QUALITY: u8 = 80;

/// How many leading bytes to sniff for a vector prologue
const SNIFF_LEN: usize = 200;

/// Last-resort placeholder when even the generated square cannot be encoded:
/// a 1x1 transparent GIF.
const FALLBACK_PIXEL: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// Derive a small raster thumbnail from raw image bytes, as a data URI.
///
/// Aspect ratio is preserved; the longer dimension is clamped to the
/// requested max. Vector input that cannot be rasterized is passed through
/// re-wrapped as an SVG data URI. This function never fails.
pub fn derive_thumbnail(
    bytes: &[u8],
    declared_type: Option<&str>,
    max_width: u32,
    max_height: u32,
) -> String {
    let vector = is_vector(bytes, declared_type);

    match image::load_from_memory(bytes) {
        Ok(img) => match encode_scaled(&img, max_width, max_height) {
            Ok(uri) => return uri,
            Err(e) => debug!("thumbnail encode failed: {}", e),
        },
        Err(e) => debug!(vector, "thumbnail decode failed: {}", e),
    }

    // Vector renderers reject bitmap decoding; hand the markup back as-is so
    // the consumer's own renderer can draw it (no raster scaling happened).
    if vector {
        return format!("data:image/svg+xml;base64,{}", BASE64.encode(bytes));
    }

    placeholder(max_width, max_height)
}

/// Derive with the default 50x50 bounding box
pub fn derive_default(bytes: &[u8], declared_type: Option<&str>) -> String {
    derive_thumbnail(bytes, declared_type, MAX_THUMB_WIDTH, MAX_THUMB_HEIGHT)
}

/// Detect vector (SVG/XML) input by declared type or by sniffing the first
/// bytes for an XML/SVG prologue
pub fn is_vector(bytes: &[u8], declared_type: Option<&str>) -> bool {
    if let Some(ty) = declared_type {
        let ty = ty.to_ascii_lowercase();
        if ty.contains("svg") || ty.contains("xml") {
            return true;
        }
    }

    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start();
    head.starts_with("<?xml") || head.starts_with("<svg")
}

/// Scale preserving aspect ratio and encode as a JPEG data URI
fn encode_scaled(img: &DynamicImage, max_width: u32, max_height: u32) -> Result<String, image::ImageError> {
    // thumbnail() clamps the longer side to the bounds and rounds the
    // shorter side to the nearest pixel
    let scaled = img.thumbnail(max_width, max_height).to_rgb8();

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, THUMB_QUALITY);
    encoder.encode(
        scaled.as_raw(),
        scaled.width(),
        scaled.height(),
        ExtendedColorType::Rgb8,
    )?;

    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&buf)))
}

/// Neutral gray square used when the input is undecodable
fn placeholder(width: u32, height: u32) -> String {
    let square = RgbImage::from_pixel(width.max(1), height.max(1), image::Rgb([204, 204, 204]));

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, THUMB_QUALITY);
    match encoder.encode(square.as_raw(), square.width(), square.height(), ExtendedColorType::Rgb8) {
        Ok(()) => format!("data:image/jpeg;base64,{}", BASE64.encode(&buf)),
        Err(_) => FALLBACK_PIXEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn decode_data_uri(uri: &str) -> DynamicImage {
        let b64 = uri.split(',').nth(1).unwrap();
        let bytes = BASE64.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_raster_input_scaled_within_bounds() {
        let uri = derive_default(&png_bytes(200, 100), Some("image/png"));
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let thumb = decode_data_uri(&uri);
        assert_eq!(thumb.width(), 50);
        assert_eq!(thumb.height(), 25);
    }

    #[test]
    fn test_small_input_not_upscaled_beyond_bounds() {
        let uri = derive_default(&png_bytes(10, 10), Some("image/png"));
        let thumb = decode_data_uri(&uri);
        assert!(thumb.width() <= 50);
        assert!(thumb.height() <= 50);
    }

    #[test]
    fn test_svg_passthrough() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="4" height="4"/></svg>"#;
        let uri = derive_default(svg, Some("image/svg+xml"));
        assert!(uri.starts_with("data:image/svg+xml;base64,"));

        let b64 = uri.split(',').nth(1).unwrap();
        assert_eq!(BASE64.decode(b64).unwrap(), svg.to_vec());
    }

    #[test]
    fn test_svg_detected_by_sniffing_without_declared_type() {
        let svg = br#"  <?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"/>"#;
        let uri = derive_default(svg, None);
        assert!(uri.starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn test_garbage_input_yields_placeholder() {
        let uri = derive_default(&[0xDE, 0xAD, 0xBE, 0xEF], Some("image/png"));
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let thumb = decode_data_uri(&uri);
        assert_eq!(thumb.width(), 50);
        assert_eq!(thumb.height(), 50);
    }

    #[test]
    fn test_empty_input_yields_placeholder() {
        let uri = derive_default(&[], None);
        assert!(uri.starts_with("data:"));
    }

    #[test]
    fn test_never_panics_on_truncated_png() {
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(bytes.len() / 2);
        let uri = derive_default(&bytes, Some("image/png"));
        assert!(uri.starts_with("data:"));
    }
}
