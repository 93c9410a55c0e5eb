//! Folio Viewer Library
//!
//! Virtual scrolling for very long documents. Only pages inside a small
//! buffer around the viewport exist as rendered surfaces; everything else
//! is a row in an immutable layout table.

pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod host;
pub mod scroller;
pub mod slots;
pub mod viewport;
pub mod zoom;

pub use config::{ConfigError, ScrollerConfig};
pub use error::ScrollerError;
pub use events::{EventHub, ScrollerEvent};
pub use geometry::{
    compute_layout, ContainerSize, FitMode, GeometryOptions, LayoutPolicy, LayoutTable,
    PageLayout, ParseFitModeError,
};
pub use host::{FixedViewport, ScrollBehavior, ScrollHost};
pub use scroller::{RenderedPage, ScrollerState, ScrollerStats, VirtualScroller};
pub use slots::{Slot, SlotManager, SlotStats, SlotSyncReport};
pub use viewport::{current_page, get_range, ViewportRange};
pub use zoom::{clamp_zoom, zoom_in_from, zoom_out_from, MAX_ZOOM, MIN_ZOOM, ZOOM_LEVELS};
