//! Render task types and queue ordering
//!
//! Renders are ordered in two groups: pages that are currently visible come
//! first, pages kept alive in the scroll buffer come second. Within a group
//! pages closer to the viewport's vertical midpoint are rendered earlier, so
//! the pages a user scrolls toward are front-loaded.

use std::cmp::Ordering;

/// Monotonically increasing identity of a dispatched render
pub type Generation = u64;

/// Relative tolerance under which two scales are considered the same
pub const SCALE_TOLERANCE: f64 = 1e-3;

/// Whether output rendered at `rendered` is still valid for `target`
///
/// ```
/// use folio_scheduler::scales_match;
///
/// assert!(scales_match(1.3333, 1.33334));
/// assert!(!scales_match(1.0, 2.0));
/// ```
pub fn scales_match(rendered: f64, target: f64) -> bool {
    let reference = rendered.abs().max(target.abs()).max(f64::EPSILON);
    (rendered - target).abs() / reference <= SCALE_TOLERANCE
}

/// Render priority groups
///
/// Higher values are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPriority {
    /// Page is inside the scroll buffer but not on screen
    Buffer = 0,

    /// Page intersects the viewport
    Visible = 1,
}

/// A render handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTask {
    /// Unique, monotonically increasing generation token
    pub generation: Generation,

    /// Page to render
    pub page_index: u32,

    /// Layout scale to render at
    pub scale: f64,

    /// Priority group the page was queued in
    pub priority: RenderPriority,
}

/// Geometry the scheduler needs from the current layout snapshot
///
/// Implemented by the viewer's layout table; the scheduler stays agnostic of
/// how pages are laid out.
pub trait PageGeometry {
    /// Effective scale of a page in the current layout
    fn page_scale(&self, page_index: u32) -> Option<f64>;

    /// Vertical center of a page in scroll coordinates
    fn page_center(&self, page_index: u32) -> Option<f64>;
}

/// A queued, not yet dispatched render
///
/// Sorting a slice of pending renders ascending yields dispatch order:
/// priority group first (visible before buffer), then distance from the
/// priority center, then page index for determinism.
#[derive(Debug, Clone)]
pub struct PendingRender {
    /// Page to render
    pub page_index: u32,

    /// Target layout scale
    pub scale: f64,

    /// Priority group
    pub priority: RenderPriority,

    /// Absolute distance of the page center from the priority center
    pub distance: f64,
}

impl PartialEq for PendingRender {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingRender {}

impl PartialOrd for PendingRender {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRender {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority sorts first
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.page_index.cmp(&other.page_index))
    }
}
