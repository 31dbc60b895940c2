//! Encoded image bytes to and from [`RasterBuffer`].
//!
//! Accepts whatever the `image` crate can decode with the enabled
//! features (PNG, JPEG, BMP, WebP). Output is always PNG. The filter
//! stages never call into this module; it exists so the CLI and the
//! worker share one decode path.

use image::ImageEncoder;

use crate::raster::RasterBuffer;
use crate::types::PipelineError;

/// Decode raw image bytes into an RGBA buffer.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RasterBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(RasterBuffer::from(img.to_rgba8()))
}

/// Encode a buffer as an RGBA PNG.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the PNG encoder fails.
pub fn encode_png(buffer: &RasterBuffer) -> Result<Vec<u8>, PipelineError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder
        .write_image(
            buffer.samples(),
            buffer.width(),
            buffer.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::ImageEncode(e.to_string()))?;
    Ok(png_bytes)
}
