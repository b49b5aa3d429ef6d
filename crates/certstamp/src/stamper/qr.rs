//! QR rendering for verification URLs.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::Luma;
use qrcode::{EcLevel, QrCode};

use crate::error::StampError;

/// Pixels per QR module in the rendered bitmap. The embedded image is
/// scaled to page units anyway; this only affects preview sharpness.
const MODULE_PIXELS: u32 = 4;

/// A rendered QR code: raw grayscale pixels for PDF embedding plus a
/// PNG encoding for the preview payload.
pub struct QrImage {
    pub width: u32,
    pub height: u32,
    /// 8-bit grayscale, row-major, `width * height` bytes.
    pub pixels: Vec<u8>,
    png: Vec<u8>,
}

impl QrImage {
    /// `data:image/png;base64,` rendering of the QR code.
    pub fn to_data_url(&self) -> Result<String, StampError> {
        Ok(format!("data:image/png;base64,{}", BASE64.encode(&self.png)))
    }
}

/// Renders `payload` as a QR code with high error correction, so the
/// code stays scannable when printed small or partially obscured.
pub fn render(payload: &str) -> Result<QrImage, StampError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)
        .map_err(|e| StampError::QrRender(e.to_string()))?;

    let bitmap = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .build();

    let (width, height) = bitmap.dimensions();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(bitmap.clone())
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| StampError::QrRender(e.to_string()))?;

    Ok(QrImage {
        width,
        height,
        pixels: bitmap.into_raw(),
        png,
    })
}
