//! Page slots
//!
//! A slot is the renderable stand-in for one page inside the buffered range.
//! It owns the page's pixels. Slots are created when a page enters the
//! buffer and destroyed, with their pixels released, when it leaves.

use crate::geometry::{LayoutTable, PageLayout};
use crate::viewport::ViewportRange;
use folio_render::RgbaImage;
use folio_scheduler::{scales_match, RenderScheduler};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Slot {
    page_index: u32,
    y_offset: f64,
    css_width: f64,
    css_height: f64,
    target_scale: f64,
    surface: RgbaImage,
    rendered_scale: Option<f64>,
    text_layer: Option<String>,
}

impl Slot {
    fn placeholder(page: &PageLayout) -> Self {
        Self {
            page_index: page.page_index,
            y_offset: page.y_offset,
            css_width: page.css_width,
            css_height: page.css_height,
            target_scale: page.scale,
            surface: RgbaImage::new(0, 0),
            rendered_scale: None,
            text_layer: None,
        }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn y_offset(&self) -> f64 {
        self.y_offset
    }

    pub fn css_width(&self) -> f64 {
        self.css_width
    }

    pub fn css_height(&self) -> f64 {
        self.css_height
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn rendered_scale(&self) -> Option<f64> {
        self.rendered_scale
    }

    pub fn text_layer(&self) -> Option<&str> {
        self.text_layer.as_deref()
    }

    /// No pixels yet; the slot reserves its layout size only
    pub fn is_placeholder(&self) -> bool {
        self.rendered_scale.is_none()
    }

    /// Pixels were rendered at a scale the layout no longer uses
    pub fn is_stale(&self) -> bool {
        self.rendered_scale.is_some_and(|rendered| !scales_match(rendered, self.target_scale))
    }

    pub fn surface_bytes(&self) -> usize {
        self.surface.as_raw().len()
    }

    fn reposition(&mut self, page: &PageLayout) -> bool {
        let moved = self.y_offset != page.y_offset
            || self.css_width != page.css_width
            || self.css_height != page.css_height;
        self.y_offset = page.y_offset;
        self.css_width = page.css_width;
        self.css_height = page.css_height;
        self.target_scale = page.scale;
        moved
    }

    fn release(&mut self) -> usize {
        let bytes = self.surface_bytes();
        self.surface = RgbaImage::new(0, 0);
        self.rendered_scale = None;
        self.text_layer = None;
        bytes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSyncReport {
    pub created: Vec<u32>,
    pub destroyed: Vec<u32>,
    pub repositioned: Vec<u32>,
    pub marked_stale: Vec<u32>,
}

impl SlotSyncReport {
    /// Check if slots were created or destroyed
    pub fn has_churn(&self) -> bool {
        !self.created.is_empty() || !self.destroyed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub live_slots: usize,
    pub rendered_slots: usize,
    pub stale_slots: usize,
    pub resident_bytes: usize,
    pub slots_created: u64,
    pub slots_destroyed: u64,
    pub released_bytes: u64,
}

/// Sole owner of page slots and their surfaces
#[derive(Debug, Default)]
pub struct SlotManager {
    slots: BTreeMap<u32, Slot>,
    created: u64,
    destroyed: u64,
    released_bytes: u64,
}

impl SlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the slot set in line with the buffered range
    ///
    /// Slots outside `range` are destroyed after the scheduler releases
    /// their page. Pages in range without a slot get a placeholder, and
    /// surviving slots follow the layout in place.
    pub fn sync(
        &mut self,
        range: &ViewportRange,
        layout: &LayoutTable,
        scheduler: &mut RenderScheduler,
    ) -> SlotSyncReport {
        let mut report = SlotSyncReport::default();

        let leaving: Vec<u32> = self
            .slots
            .keys()
            .copied()
            .filter(|page| !range.is_buffered(*page) || layout.page(*page).is_none())
            .collect();
        for page_index in leaving {
            scheduler.release_page(page_index);
            if self.destroy(page_index) {
                report.destroyed.push(page_index);
            }
        }

        for page_index in range.buffer() {
            let Some(page) = layout.page(page_index) else {
                continue;
            };

            match self.slots.get_mut(&page_index) {
                Some(slot) => {
                    let was_stale = slot.is_stale();
                    if slot.reposition(page) {
                        report.repositioned.push(page_index);
                    }
                    if !was_stale && slot.is_stale() {
                        report.marked_stale.push(page_index);
                    }
                }
                None => {
                    self.slots.insert(page_index, Slot::placeholder(page));
                    self.created += 1;
                    report.created.push(page_index);
                }
            }
        }

        if report.has_churn() {
            tracing::trace!(
                created = report.created.len(),
                destroyed = report.destroyed.len(),
                live = self.slots.len(),
                "slots synced"
            );
        }

        report
    }

    /// Write a finished render into its slot
    ///
    /// Returns `false` without touching anything when the slot no longer
    /// exists.
    pub fn apply_render(&mut self, page_index: u32, scale: f64, surface: RgbaImage) -> bool {
        let Some(slot) = self.slots.get_mut(&page_index) else {
            return false;
        };
        slot.surface = surface;
        slot.rendered_scale = Some(scale);
        true
    }

    pub fn set_text_layer(&mut self, page_index: u32, text: String) -> bool {
        let Some(slot) = self.slots.get_mut(&page_index) else {
            return false;
        };
        slot.text_layer = Some(text);
        true
    }

    /// Destroy one slot, releasing its surface
    pub fn destroy(&mut self, page_index: u32) -> bool {
        let Some(mut slot) = self.slots.remove(&page_index) else {
            return false;
        };
        self.released_bytes += slot.release() as u64;
        self.destroyed += 1;
        true
    }

    /// Destroy every slot, returning how many there were
    pub fn destroy_all(&mut self) -> usize {
        let pages: Vec<u32> = self.slots.keys().copied().collect();
        pages.into_iter().filter(|page| self.destroy(*page)).count()
    }

    pub fn slot(&self, page_index: u32) -> Option<&Slot> {
        self.slots.get(&page_index)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn pages(&self) -> Vec<u32> {
        self.slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            live_slots: self.slots.len(),
            rendered_slots: self.slots.values().filter(|slot| !slot.is_placeholder()).count(),
            stale_slots: self.slots.values().filter(|slot| slot.is_stale()).count(),
            resident_bytes: self.slots.values().map(Slot::surface_bytes).sum(),
            slots_created: self.created,
            slots_destroyed: self.destroyed,
            released_bytes: self.released_bytes,
        }
    }
}
