//! Certificate stamping: QR rendering and PDF embedding.
//!
//! A pure transform: one source PDF in, one stamped PDF plus a preview
//! payload out. All persistence and state transitions belong to the
//! orchestrator.

pub mod pdf;
pub mod qr;

use serde::{Deserialize, Serialize};

use crate::error::StampError;

/// Rendered size of the embedded QR code, in page units.
pub const QR_RENDER_SIZE: f64 = 50.0;

/// Normalized QR placement: percentages of the first page's width and
/// height, both in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPlacement {
    pub x: f64,
    pub y: f64,
}

impl QrPlacement {
    pub fn new(x: f64, y: f64) -> Result<Self, StampError> {
        if !(0.0..=100.0).contains(&x) || !(0.0..=100.0).contains(&y) {
            return Err(StampError::InvalidPlacement { x, y });
        }
        Ok(Self { x, y })
    }

    /// Converts the percentages to absolute page-space coordinates.
    pub fn to_page_coords(&self, page_width: f64, page_height: f64) -> (f64, f64) {
        (
            self.x / 100.0 * page_width,
            self.y / 100.0 * page_height,
        )
    }
}

/// Result of stamping one certificate.
pub struct StampOutput {
    /// The stamped PDF, ready for the blob store.
    pub pdf_bytes: Vec<u8>,
    /// `data:image/png;base64,` rendering of the same QR payload for
    /// quick in-UI preview.
    pub qr_data_url: String,
}

/// Stamps verification QR codes into certificate PDFs.
#[derive(Debug, Clone, Default)]
pub struct CertificateStamper;

impl CertificateStamper {
    pub fn new() -> Self {
        Self
    }

    /// Renders the verification QR and embeds it into the source PDF's
    /// first page at the given placement.
    pub fn stamp(
        &self,
        source_pdf: &[u8],
        placement: &QrPlacement,
        verification_url: &str,
    ) -> Result<StampOutput, StampError> {
        let _span = tracing::info_span!("stamper.stamp").entered();

        let qr_image = qr::render(verification_url)?;
        let pdf_bytes = pdf::embed_qr(source_pdf, placement, &qr_image)?;

        Ok(StampOutput {
            pdf_bytes,
            qr_data_url: qr_image.to_data_url()?,
        })
    }

    /// Renders only the preview payload, without touching any PDF.
    /// Used when a verification URL is re-derived in place.
    pub fn preview_data_url(&self, verification_url: &str) -> Result<String, StampError> {
        qr::render(verification_url)?.to_data_url()
    }
}
