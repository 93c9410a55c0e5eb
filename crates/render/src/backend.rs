//! Decoding backend interface
//!
//! The viewer never rasterizes anything itself. Everything it knows about a
//! document comes through [`DecodingBackend`]: the page count, each page's
//! natural size, and RGBA renders at a requested scale.

use folio_scheduler::{Cancelled, CancellationToken, RenderFailure};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Width used when a page's real size is unknown (US Letter, points)
pub const FALLBACK_PAGE_WIDTH: f64 = 612.0;

/// Height used when a page's real size is unknown (US Letter, points)
pub const FALLBACK_PAGE_HEIGHT: f64 = 792.0;

/// Intrinsic size of a page at scale 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub natural_width: f64,
    pub natural_height: f64,
}

impl PageDimensions {
    /// Create dimensions, substituting the fallback for unusable values
    pub fn new(natural_width: f64, natural_height: f64) -> Self {
        Self { natural_width, natural_height }.sanitized()
    }

    /// US Letter, used until a page's real size is known
    pub const fn fallback() -> Self {
        Self { natural_width: FALLBACK_PAGE_WIDTH, natural_height: FALLBACK_PAGE_HEIGHT }
    }

    pub fn is_valid(&self) -> bool {
        self.natural_width.is_finite()
            && self.natural_height.is_finite()
            && self.natural_width > 0.0
            && self.natural_height > 0.0
    }

    pub fn sanitized(self) -> Self {
        if self.is_valid() {
            self
        } else {
            Self::fallback()
        }
    }
}

impl Default for PageDimensions {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Parameters of one page render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f64,
    pub device_pixel_ratio: f64,
}

impl RenderRequest {
    pub fn new(page_index: u32, scale: f64) -> Self {
        Self { page_index, scale, device_pixel_ratio: 1.0 }
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    /// Pixel size of the surface for a page of the given dimensions
    ///
    /// Non-positive scales and ratios are treated as 1. Both sides are at
    /// least one pixel.
    pub fn pixel_size(&self, dimensions: PageDimensions) -> (u32, u32) {
        let scale = if self.scale.is_finite() && self.scale > 0.0 { self.scale } else { 1.0 };
        let ratio = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        let dimensions = dimensions.sanitized();
        let width = (dimensions.natural_width * scale * ratio).round().max(1.0) as u32;
        let height = (dimensions.natural_height * scale * ratio).round().max(1.0) as u32;
        (width, height)
    }
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self::new(0, 1.0)
    }
}

/// One entry of a document outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    pub page_index: Option<u32>,
    pub level: u32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    EmptyDocument,
    #[error("render cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<Cancelled> for BackendError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<BackendError> for RenderFailure {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Cancelled => RenderFailure::Cancelled,
            other => RenderFailure::Failed(other.to_string()),
        }
    }
}

/// Source of page sizes and page rasters
///
/// Implementations are shared between the orchestrator thread, the render
/// workers and the dimension loader, hence `Send + Sync`.
pub trait DecodingBackend: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_dimensions(&self, page_index: u32) -> Result<PageDimensions, BackendError>;

    /// Rasterize one page
    ///
    /// Must poll `token` between units of work and return
    /// [`BackendError::Cancelled`] promptly once it fires.
    fn render_page(
        &self,
        request: RenderRequest,
        token: &CancellationToken,
    ) -> Result<RgbaImage, BackendError>;

    fn outline(&self) -> Result<Vec<OutlineEntry>, BackendError> {
        Ok(Vec::new())
    }

    fn text_content(&self, _page_index: u32) -> Result<String, BackendError> {
        Ok(String::new())
    }
}

pub(crate) fn check_page(page_index: u32, page_count: u32) -> Result<(), BackendError> {
    if page_index < page_count {
        Ok(())
    } else {
        Err(BackendError::PageOutOfRange { page: page_index, page_count })
    }
}

/// Paint a blank page: white with a one pixel grey border
///
/// Checks `token` every few rows.
pub(crate) fn paint_blank_page(
    width: u32,
    height: u32,
    fill: Rgba<u8>,
    token: &CancellationToken,
) -> Result<RgbaImage, BackendError> {
    const ROWS_PER_CHECK: u32 = 64;
    const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

    token.check()?;
    let mut image = RgbaImage::new(width, height);
    for y in 0..height {
        if y % ROWS_PER_CHECK == 0 {
            token.check()?;
        }
        for x in 0..width {
            image.put_pixel(x, y, fill);
        }
    }

    if width >= 4 && height >= 4 {
        for x in 0..width {
            image.put_pixel(x, 0, BORDER);
            image.put_pixel(x, height - 1, BORDER);
        }
        for y in 0..height {
            image.put_pixel(0, y, BORDER);
            image.put_pixel(width - 1, y, BORDER);
        }
    }

    Ok(image)
}
