//! Folio Render Library
//!
//! Document decoding for the Folio reader: the [`DecodingBackend`] trait the
//! viewer consumes, a `lopdf` based PDF backend, a synthetic backend for
//! demos and tests, and progressive page-dimension loading.

pub mod backend;
pub mod dimensions;
pub mod pdf;
pub mod synthetic;

pub use backend::{
    BackendError, DecodingBackend, OpenSource, OutlineEntry, PageDimensions, RenderRequest,
    RgbaImage, FALLBACK_PAGE_HEIGHT, FALLBACK_PAGE_WIDTH,
};
pub use dimensions::{fetch_dimensions, DimensionBatch, DimensionLoader, DimensionTable};
pub use pdf::{build_blank_pdf, LopdfBackend};
pub use synthetic::SyntheticBackend;
