//! Frame coalescing and per-frame time budgets
//!
//! Scroll and resize events can arrive many times per display frame. The
//! [`FrameCoalescer`] keeps at most one pending frame: the first request
//! schedules it, later ones are absorbed into it. [`FrameBudget`] bounds how
//! long a frame may spend applying finished renders before handing control
//! back to the host.

use std::time::{Duration, Instant};

/// Default frame budget for 60 FPS displays (16.67ms)
pub const FRAME_BUDGET_60FPS: Duration = Duration::from_micros(16_667);

/// Work collected for the next frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameWork {
    /// Layout must be recomputed (resize, zoom, new page dimensions)
    pub relayout: bool,

    /// Visible range must be reconciled (scroll or any of the above)
    pub reconcile: bool,
}

/// Coalesces event bursts into one pending frame
///
/// # Example
///
/// ```
/// use folio_scheduler::FrameCoalescer;
///
/// let mut frames = FrameCoalescer::new();
/// assert!(frames.request());
/// assert!(!frames.request()); // absorbed
/// assert!(!frames.request_relayout()); // still the same frame
///
/// let work = frames.take().unwrap();
/// assert!(work.relayout && work.reconcile);
/// assert!(frames.take().is_none());
/// assert_eq!(frames.absorbed(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameCoalescer {
    pending: Option<FrameWork>,
    frames: u64,
    absorbed: u64,
}

impl FrameCoalescer {
    /// Create a coalescer with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reconciliation frame
    ///
    /// Returns `true` if this request scheduled a new frame, `false` if it
    /// was absorbed into the pending one.
    pub fn request(&mut self) -> bool {
        self.schedule(FrameWork { relayout: false, reconcile: true })
    }

    /// Request a frame that also recomputes layout
    pub fn request_relayout(&mut self) -> bool {
        self.schedule(FrameWork { relayout: true, reconcile: true })
    }

    fn schedule(&mut self, work: FrameWork) -> bool {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.relayout |= work.relayout;
                pending.reconcile |= work.reconcile;
                self.absorbed += 1;
                false
            }
            None => {
                self.pending = Some(work);
                true
            }
        }
    }

    /// Take the pending work when the frame fires
    pub fn take(&mut self) -> Option<FrameWork> {
        let work = self.pending.take()?;
        self.frames += 1;
        Some(work)
    }

    /// Drop any pending work without running it
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Check if a frame is pending
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of frames taken so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of requests absorbed into an already pending frame
    pub fn absorbed(&self) -> u64 {
        self.absorbed
    }
}

/// Time budget for the work done inside one frame
#[derive(Debug, Clone)]
pub struct FrameBudget {
    frame_start: Instant,
    budget: Duration,
}

impl FrameBudget {
    /// Start a budget of `budget` from now
    pub fn new(budget: Duration) -> Self {
        Self { frame_start: Instant::now(), budget }
    }

    /// Create a frame budget for 60 FPS displays
    pub fn for_60fps() -> Self {
        Self::new(FRAME_BUDGET_60FPS)
    }

    /// A budget that never runs out
    pub fn unlimited() -> Self {
        Self::new(Duration::MAX)
    }

    /// Get the elapsed time since frame start
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Get the remaining time, `Duration::ZERO` once exceeded
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// Check if the budget has been used up
    pub fn is_exceeded(&self) -> bool {
        self.remaining() == Duration::ZERO
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self::for_60fps()
    }
}
