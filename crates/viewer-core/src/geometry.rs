use folio_render::PageDimensions;
use folio_scheduler::PageGeometry;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_PAGE_GAP: f64 = 12.0;
pub const DEFAULT_HORIZONTAL_PADDING: f64 = 40.0;
pub const DEFAULT_VERTICAL_PADDING: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMode {
    #[default]
    Fixed,
    FitWidth,
    FitHeight,
    FitPage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fit mode: {0}")]
pub struct ParseFitModeError(String);

impl FromStr for FitMode {
    type Err = ParseFitModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" | "none" => Ok(Self::Fixed),
            "fit-width" | "width" => Ok(Self::FitWidth),
            "fit-height" | "height" => Ok(Self::FitHeight),
            "fit-page" | "page" => Ok(Self::FitPage),
            _ => Err(ParseFitModeError(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPolicy {
    pub mode: FitMode,
    pub scale: f64,
}

impl LayoutPolicy {
    pub fn fixed(scale: f64) -> Self {
        Self { mode: FitMode::Fixed, scale }
    }

    pub fn fit(mode: FitMode) -> Self {
        Self { mode, scale: 1.0 }
    }

    fn fallback_scale(&self) -> f64 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self::fixed(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryOptions {
    pub page_gap: f64,
    pub horizontal_padding: f64,
    pub vertical_padding: f64,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            page_gap: DEFAULT_PAGE_GAP,
            horizontal_padding: DEFAULT_HORIZONTAL_PADDING,
            vertical_padding: DEFAULT_VERTICAL_PADDING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageLayout {
    pub page_index: u32,
    pub y_offset: f64,
    pub scale: f64,
    pub css_width: f64,
    pub css_height: f64,
}

impl PageLayout {
    pub fn bottom(&self) -> f64 {
        self.y_offset + self.css_height
    }

    pub fn center(&self) -> f64 {
        self.y_offset + self.css_height / 2.0
    }
}

/// Immutable layout snapshot of a whole document
///
/// Shared as `Arc<LayoutTable>` and replaced wholesale on relayout.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LayoutTable {
    pages: Vec<PageLayout>,
    total_height: f64,
}

impl LayoutTable {
    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }

    pub fn page(&self, page_index: u32) -> Option<&PageLayout> {
        self.pages.get(page_index as usize)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    /// Last page whose top edge is at or above `offset`
    ///
    /// Offsets above the first page map to page 0, offsets past the end map
    /// to the last page. `None` only for an empty table.
    pub fn find_page_at(&self, offset: f64) -> Option<u32> {
        if self.pages.is_empty() {
            return None;
        }
        let after = self.pages.partition_point(|page| page.y_offset <= offset);
        Some(after.saturating_sub(1) as u32)
    }

    /// Scroll top that brings `page_index` into view with `margin` above it
    pub fn scroll_offset_for(&self, page_index: u32, margin: f64) -> Option<f64> {
        self.page(page_index).map(|page| (page.y_offset - margin).max(0.0))
    }
}

impl PageGeometry for LayoutTable {
    fn page_scale(&self, page_index: u32) -> Option<f64> {
        self.page(page_index).map(|page| page.scale)
    }

    fn page_center(&self, page_index: u32) -> Option<f64> {
        self.page(page_index).map(PageLayout::center)
    }
}

pub fn compute_layout(
    dimensions: &[PageDimensions],
    policy: LayoutPolicy,
    container: ContainerSize,
    options: &GeometryOptions,
) -> LayoutTable {
    if dimensions.is_empty() {
        return LayoutTable::default();
    }

    let gap = if options.page_gap.is_finite() { options.page_gap.max(0.0) } else { 0.0 };
    let mut pages = Vec::with_capacity(dimensions.len());
    let mut y = gap;

    for (index, dimensions) in dimensions.iter().enumerate() {
        let dimensions = dimensions.sanitized();
        let scale = page_scale(dimensions, policy, container, options);
        let css_width = dimensions.natural_width * scale;
        let css_height = dimensions.natural_height * scale;

        pages.push(PageLayout { page_index: index as u32, y_offset: y, scale, css_width, css_height });
        y += css_height + gap;
    }

    LayoutTable { pages, total_height: y }
}

fn page_scale(
    dimensions: PageDimensions,
    policy: LayoutPolicy,
    container: ContainerSize,
    options: &GeometryOptions,
) -> f64 {
    let available = |extent: f64, padding: f64, natural: f64| {
        let space = extent - padding;
        (space.is_finite() && space > 0.0).then(|| space / natural)
    };
    let by_width = || available(container.width, options.horizontal_padding, dimensions.natural_width);
    let by_height =
        || available(container.height, options.vertical_padding, dimensions.natural_height);

    let scale = match policy.mode {
        FitMode::Fixed => None,
        FitMode::FitWidth => by_width(),
        FitMode::FitHeight => by_height(),
        FitMode::FitPage => match (by_width(), by_height()) {
            (Some(width), Some(height)) => Some(width.min(height)),
            (width, height) => width.or(height),
        },
    };

    scale.unwrap_or_else(|| policy.fallback_scale())
}
