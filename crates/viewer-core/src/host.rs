use crate::geometry::ContainerSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// The scrollable container the scroller lays pages out in
///
/// Implemented by the UI layer. After the scroll position changes, the host
/// calls [`crate::VirtualScroller::on_scroll`]; after a size change,
/// [`crate::VirtualScroller::on_resize`].
pub trait ScrollHost {
    fn scroll_top(&self) -> f64;

    fn client_size(&self) -> ContainerSize;

    fn scroll_to(&mut self, top: f64, behavior: ScrollBehavior);

    /// Total scrollable height changed
    fn set_content_height(&mut self, _height: f64) {}
}

/// Headless scroll container
///
/// Behaves like a browser scroll box: the scroll position is clamped to the
/// content height. Used by the CLI and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedViewport {
    scroll_top: f64,
    size: ContainerSize,
    content_height: f64,
}

impl FixedViewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { scroll_top: 0.0, size: ContainerSize::new(width, height), content_height: 0.0 }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.size = ContainerSize::new(width, height);
        self.clamp();
    }

    pub fn content_height(&self) -> f64 {
        self.content_height
    }

    pub fn max_scroll_top(&self) -> f64 {
        (self.content_height - self.size.height).max(0.0)
    }

    fn clamp(&mut self) {
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll_top());
    }
}

impl ScrollHost for FixedViewport {
    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn client_size(&self) -> ContainerSize {
        self.size
    }

    fn scroll_to(&mut self, top: f64, _behavior: ScrollBehavior) {
        self.scroll_top = if top.is_finite() { top } else { 0.0 };
        self.clamp();
    }

    fn set_content_height(&mut self, height: f64) {
        self.content_height = height.max(0.0);
        self.clamp();
    }
}
