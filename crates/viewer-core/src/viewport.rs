use crate::geometry::LayoutTable;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

pub const DEFAULT_BUFFER_PAGES: u32 = 3;
pub const DEFAULT_CURRENT_PAGE_FRACTION: f64 = 0.3;

/// Visible and buffered pages, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewportRange {
    pub visible_start: u32,
    pub visible_end: u32,
    pub buffer_start: u32,
    pub buffer_end: u32,
}

impl ViewportRange {
    pub fn visible(&self) -> RangeInclusive<u32> {
        self.visible_start..=self.visible_end
    }

    pub fn buffer(&self) -> RangeInclusive<u32> {
        self.buffer_start..=self.buffer_end
    }

    pub fn is_buffered(&self, page_index: u32) -> bool {
        self.buffer().contains(&page_index)
    }

    /// Pages that need a rendered surface
    pub fn needed(&self) -> BTreeSet<u32> {
        self.buffer().collect()
    }
}

pub fn get_range(
    layout: &LayoutTable,
    scroll_top: f64,
    client_height: f64,
    buffer_pages: u32,
) -> Option<ViewportRange> {
    let scroll_top = if scroll_top.is_finite() { scroll_top.max(0.0) } else { 0.0 };
    let client_height = if client_height.is_finite() { client_height.max(0.0) } else { 0.0 };
    let bottom = scroll_top + client_height;
    let last = layout.page_count().checked_sub(1)?;

    let mut start = layout.find_page_at(scroll_top)?;
    if start < last && layout.page(start).is_some_and(|page| page.bottom() < scroll_top) {
        // Scroll top sits in the gap below `start`
        start += 1;
    }

    let mut end = start;
    while end < last && layout.page(end + 1).is_some_and(|page| page.y_offset <= bottom) {
        end += 1;
    }

    Some(ViewportRange {
        visible_start: start,
        visible_end: end,
        buffer_start: start.saturating_sub(buffer_pages),
        buffer_end: end.saturating_add(buffer_pages).min(last),
    })
}

/// First page whose bottom edge lies below the reading line
///
/// The reading line sits `fraction` of the way down the viewport. Returns
/// the last page when no page reaches below it, `None` for an empty layout.
pub fn current_page(
    layout: &LayoutTable,
    scroll_top: f64,
    client_height: f64,
    fraction: f64,
) -> Option<u32> {
    let last = layout.page_count().checked_sub(1)?;
    let line = scroll_top + client_height * fraction;
    let index = layout.pages().partition_point(|page| page.bottom() <= line) as u32;
    Some(index.min(last))
}
