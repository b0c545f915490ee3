//! Image encoding helpers.
//!
//! Rasterised pages are uploaded as PNG: lossless compression keeps glyph
//! edges crisp, which matters more for recognition accuracy than file size.
//! Providers that take JSON bodies want the bytes base64-encoded, either bare
//! or as a `data:` URI.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded image → {} bytes PNG", buf.len());
    Ok(buf)
}

/// Plain base64 (standard alphabet, padded).
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// `data:<mime>;base64,<payload>` URI.
pub fn to_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, to_base64(bytes))
}

/// Split a `data:` URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// Wrap image bytes for a vision-LLM request.
///
/// `detail: "high"` makes GPT-4-class models tile the image at full
/// resolution; without it fine print is lost.
pub fn to_image_data(bytes: &[u8], mime_type: &str) -> ImageData {
    ImageData::new(to_base64(bytes), mime_type).with_detail("high")
}
