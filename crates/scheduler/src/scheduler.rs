//! Render scheduler
//!
//! Decides, on every tick, which pages need a fresh render, in what order,
//! and which in-flight renders have become pointless. The scheduler does not
//! execute anything itself: the owner pulls tasks with
//! [`RenderScheduler::next_dispatch`], runs them (normally on a
//! [`crate::RenderWorkerPool`]) and reports results back through
//! [`RenderScheduler::complete`].

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{
    scales_match, Generation, PageGeometry, PendingRender, RenderPriority, RenderTask,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::RangeInclusive;

/// Why a render did not produce output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderFailure {
    /// The render observed its cancellation token. Not an error.
    #[error("render cancelled")]
    Cancelled,

    /// The backend failed to render the page
    #[error("render failed: {0}")]
    Failed(String),
}

impl From<crate::cancel::Cancelled> for RenderFailure {
    fn from(_: crate::cancel::Cancelled) -> Self {
        Self::Cancelled
    }
}

/// What the scheduler made of a completed render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionVerdict {
    /// Output is current; the page is now rendered at the task's scale
    Accepted,

    /// The task was cancelled or superseded; its output must be discarded
    Stale,

    /// The render honoured a cancellation request
    Cancelled,

    /// The render failed; the page keeps its placeholder
    Failed,
}

/// Render scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total renders handed out by `next_dispatch`
    pub tasks_dispatched: u64,

    /// Renders whose output was accepted
    pub tasks_completed: u64,

    /// Renders cancelled by the scheduler
    pub tasks_cancelled: u64,

    /// Renders that failed for a reason other than cancellation
    pub tasks_failed: u64,

    /// Late results discarded by generation check
    pub stale_results: u64,

    /// Current queue size
    pub queue_size: usize,

    /// Renders dispatched whose completion has not been observed yet
    pub in_flight: usize,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pages whose in-flight render was cancelled
    pub cancelled: Vec<u32>,

    /// Pages newly added to the queue
    pub enqueued: Vec<u32>,

    /// Pages removed from the queue because they are no longer needed
    pub dropped: Vec<u32>,
}

impl ReconcileReport {
    /// Check if the pass changed nothing
    pub fn is_empty(&self) -> bool {
        self.cancelled.is_empty() && self.enqueued.is_empty() && self.dropped.is_empty()
    }
}

/// Page render scheduler
///
/// Single-threaded: owned by the orchestrator and driven from its event
/// loop. Guarantees at most one active render per page and hands out at most
/// `max_concurrent` renders whose completion has not yet been observed.
///
/// # Example
///
/// ```
/// use folio_scheduler::{CompletionVerdict, PageGeometry, RenderScheduler};
/// use std::collections::BTreeSet;
///
/// struct Uniform;
///
/// impl PageGeometry for Uniform {
///     fn page_scale(&self, _page: u32) -> Option<f64> {
///         Some(1.0)
///     }
///     fn page_center(&self, page: u32) -> Option<f64> {
///         Some(page as f64 * 1000.0 + 500.0)
///     }
/// }
///
/// let mut scheduler = RenderScheduler::new(1);
/// let needed: BTreeSet<u32> = (0..=3).collect();
/// scheduler.reconcile(&needed, 0..=1, &Uniform, 400.0);
///
/// let (task, _token) = scheduler.next_dispatch().unwrap();
/// assert_eq!(task.page_index, 0);
///
/// // Sequential: nothing else is dispatched until the first render resolves
/// assert!(scheduler.next_dispatch().is_none());
///
/// let verdict = scheduler.complete(task.generation, &Ok::<(), _>(()));
/// assert_eq!(verdict, CompletionVerdict::Accepted);
/// assert_eq!(scheduler.rendered_scale(0), Some(1.0));
/// ```
#[derive(Debug)]
pub struct RenderScheduler {
    queue: VecDeque<PendingRender>,
    registry: CancellationRegistry,
    rendered: HashMap<u32, f64>,
    failed: HashMap<u32, f64>,
    next_generation: Generation,
    max_concurrent: usize,
    stats: SchedulerStats,
}

impl RenderScheduler {
    /// Create a scheduler allowing `max_concurrent` unresolved renders
    ///
    /// A value of 0 is treated as 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            registry: CancellationRegistry::new(),
            rendered: HashMap::new(),
            failed: HashMap::new(),
            next_generation: 1,
            max_concurrent: max_concurrent.max(1),
            stats: SchedulerStats::default(),
        }
    }

    /// Reconcile the queue with the set of pages that need a surface
    ///
    /// 1. Cancels active renders for pages that are no longer needed or whose
    ///    layout scale changed.
    /// 2. Queues every needed page without valid output at its current scale,
    ///    skipping pages already queued or rendering at that scale.
    /// 3. Sorts the queue: `visible` pages first, then by distance from
    ///    `priority_center`.
    pub fn reconcile<G: PageGeometry>(
        &mut self,
        needed: &BTreeSet<u32>,
        visible: RangeInclusive<u32>,
        geometry: &G,
        priority_center: f64,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        // Pixels of pages that left the needed set are gone with their slot,
        // and failures become retryable once a page re-enters.
        self.rendered.retain(|page, _| needed.contains(page));
        self.failed.retain(|page, _| needed.contains(page));

        for (page_index, generation, scale) in self.registry.active() {
            let still_valid = needed.contains(&page_index)
                && geometry.page_scale(page_index).is_some_and(|target| scales_match(scale, target));
            if !still_valid && self.registry.cancel(generation) {
                self.stats.tasks_cancelled += 1;
                report.cancelled.push(page_index);
            }
        }

        let previous: BTreeSet<u32> = self.queue.iter().map(|pending| pending.page_index).collect();
        report.dropped = previous.iter().copied().filter(|page| !needed.contains(page)).collect();

        let mut queue = Vec::with_capacity(needed.len());
        for &page_index in needed {
            let Some(scale) = geometry.page_scale(page_index) else {
                continue;
            };

            if self.rendered.get(&page_index).is_some_and(|rendered| scales_match(*rendered, scale))
                || self.failed.get(&page_index).is_some_and(|failed| scales_match(*failed, scale))
                || self.registry.active_scale(page_index).is_some_and(|active| scales_match(active, scale))
            {
                continue;
            }

            let priority = if visible.contains(&page_index) {
                RenderPriority::Visible
            } else {
                RenderPriority::Buffer
            };
            let distance = geometry
                .page_center(page_index)
                .map_or(f64::MAX, |center| (center - priority_center).abs());

            if !previous.contains(&page_index) {
                report.enqueued.push(page_index);
            }
            queue.push(PendingRender { page_index, scale, priority, distance });
        }

        queue.sort();
        self.queue = queue.into();

        if !report.is_empty() {
            tracing::trace!(
                cancelled = report.cancelled.len(),
                enqueued = report.enqueued.len(),
                dropped = report.dropped.len(),
                queued = self.queue.len(),
                "render queue reconciled"
            );
        }

        report
    }

    /// Take the next render to execute
    ///
    /// Returns `None` while `max_concurrent` renders are unresolved (cancelled
    /// renders count until their completion is observed) or when the queue
    /// is empty.
    pub fn next_dispatch(&mut self) -> Option<(RenderTask, CancellationToken)> {
        if self.registry.len() >= self.max_concurrent {
            return None;
        }

        while let Some(pending) = self.queue.pop_front() {
            if self.registry.active_for_page(pending.page_index).is_some() {
                continue;
            }

            let generation = self.next_generation;
            self.next_generation += 1;

            let token = self.registry.register(generation, pending.page_index, pending.scale);
            self.stats.tasks_dispatched += 1;

            let task = RenderTask {
                generation,
                page_index: pending.page_index,
                scale: pending.scale,
                priority: pending.priority,
            };
            tracing::trace!(page = task.page_index, generation, scale = task.scale, "render dispatched");
            return Some((task, token));
        }

        None
    }

    /// Record the outcome of a dispatched render
    ///
    /// The verdict is `Accepted` only if `generation` is still the active
    /// render of its page; late results of cancelled or superseded renders
    /// come back as `Stale` and must not touch any surface.
    pub fn complete<P>(
        &mut self,
        generation: Generation,
        result: &Result<P, RenderFailure>,
    ) -> CompletionVerdict {
        let Some(render) = self.registry.unregister(generation) else {
            self.stats.stale_results += 1;
            return CompletionVerdict::Stale;
        };

        if render.cancelled {
            return match result {
                Err(RenderFailure::Cancelled) => CompletionVerdict::Cancelled,
                _ => {
                    self.stats.stale_results += 1;
                    CompletionVerdict::Stale
                }
            };
        }

        match result {
            Ok(_) => {
                self.rendered.insert(render.page_index, render.scale);
                self.failed.remove(&render.page_index);
                self.stats.tasks_completed += 1;
                CompletionVerdict::Accepted
            }
            Err(RenderFailure::Cancelled) => CompletionVerdict::Cancelled,
            Err(RenderFailure::Failed(reason)) => {
                tracing::warn!(page = render.page_index, generation, %reason, "page render failed");
                self.failed.insert(render.page_index, render.scale);
                self.stats.tasks_failed += 1;
                CompletionVerdict::Failed
            }
        }
    }

    /// Forget everything about a page whose slot is being destroyed
    ///
    /// Cancels its active render and drops it from the queue. Returns `true`
    /// if a render was cancelled.
    pub fn release_page(&mut self, page_index: u32) -> bool {
        self.queue.retain(|pending| pending.page_index != page_index);
        self.rendered.remove(&page_index);
        self.failed.remove(&page_index);

        let cancelled = self.registry.cancel_page(page_index).is_some();
        if cancelled {
            self.stats.tasks_cancelled += 1;
        }
        cancelled
    }

    /// Cancel every active render and clear the queue
    ///
    /// Returns the number of renders cancelled.
    pub fn cancel_all(&mut self) -> usize {
        self.queue.clear();
        let cancelled = self.registry.cancel_all();
        self.stats.tasks_cancelled += cancelled as u64;
        cancelled
    }

    /// Treat every page as unrendered so the next reconcile re-queues them
    pub fn invalidate_all(&mut self) {
        self.rendered.clear();
        self.failed.clear();
    }

    /// Scale a page was last rendered at, if any
    pub fn rendered_scale(&self, page_index: u32) -> Option<f64> {
        self.rendered.get(&page_index).copied()
    }

    /// Check if a page's last render failed
    pub fn has_failed(&self, page_index: u32) -> bool {
        self.failed.contains_key(&page_index)
    }

    /// Generation of the active render for a page
    pub fn active_generation(&self, page_index: u32) -> Option<Generation> {
        self.registry.active_for_page(page_index)
    }

    /// Pages with an active render, ascending
    pub fn active_pages(&self) -> Vec<u32> {
        self.registry.active().into_iter().map(|(page, _, _)| page).collect()
    }

    /// Queued pages in dispatch order
    pub fn queued_pages(&self) -> Vec<u32> {
        self.queue.iter().map(|pending| pending.page_index).collect()
    }

    /// Renders dispatched whose completion has not been observed yet
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Check if there is nothing queued and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.registry.is_empty()
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.clone();
        stats.queue_size = self.queue.len();
        stats.in_flight = self.registry.len();
        stats
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_HEIGHT: f64 = 1000.0;

    struct Uniform {
        scale: f64,
    }

    impl PageGeometry for Uniform {
        fn page_scale(&self, page_index: u32) -> Option<f64> {
            (page_index < 1000).then_some(self.scale)
        }

        fn page_center(&self, page_index: u32) -> Option<f64> {
            (page_index < 1000).then(|| page_index as f64 * PAGE_HEIGHT + PAGE_HEIGHT / 2.0)
        }
    }

    fn pages(range: RangeInclusive<u32>) -> BTreeSet<u32> {
        range.collect()
    }

    fn ok() -> Result<(), RenderFailure> {
        Ok(())
    }

    #[test]
    fn test_reconcile_orders_visible_then_distance() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };

        // Viewport covers pages 4..=5 with its center at 5000
        let report = scheduler.reconcile(&pages(1..=8), 4..=5, &geometry, 5000.0);

        assert_eq!(report.enqueued.len(), 8);
        assert_eq!(scheduler.queued_pages(), vec![4, 5, 3, 6, 2, 7, 1, 8]);
    }

    #[test]
    fn test_reconcile_skips_queued_and_rendered_pages() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };

        scheduler.reconcile(&pages(0..=2), 0..=0, &geometry, 500.0);
        let (task, _) = scheduler.next_dispatch().unwrap();
        scheduler.complete(task.generation, &ok());

        let report = scheduler.reconcile(&pages(0..=2), 0..=0, &geometry, 500.0);
        assert!(report.enqueued.is_empty());
        assert_eq!(scheduler.queued_pages(), vec![1, 2]);
    }

    #[test]
    fn test_sequential_dispatch_waits_for_completion() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=2), 0..=2, &geometry, 500.0);

        let (first, _) = scheduler.next_dispatch().unwrap();
        assert!(scheduler.next_dispatch().is_none());

        scheduler.complete(first.generation, &ok());
        let (second, _) = scheduler.next_dispatch().unwrap();
        assert_eq!(second.page_index, 1);
        assert!(second.generation > first.generation);
    }

    #[test]
    fn test_bounded_parallel_dispatch() {
        let mut scheduler = RenderScheduler::new(2);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=3), 0..=3, &geometry, 0.0);

        assert!(scheduler.next_dispatch().is_some());
        assert!(scheduler.next_dispatch().is_some());
        assert!(scheduler.next_dispatch().is_none());
        assert_eq!(scheduler.in_flight(), 2);
    }

    #[test]
    fn test_pages_leaving_needed_set_are_cancelled() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=3), 0..=0, &geometry, 500.0);
        let (task, token) = scheduler.next_dispatch().unwrap();
        assert_eq!(task.page_index, 0);

        let report = scheduler.reconcile(&pages(996..=999), 997..=999, &geometry, 998_500.0);

        assert_eq!(report.cancelled, vec![0]);
        assert_eq!(report.dropped, vec![1, 2, 3]);
        assert!(token.is_cancelled());
        assert_eq!(scheduler.queued_pages(), vec![998, 997, 999, 996]);
    }

    #[test]
    fn test_cancelled_render_still_occupies_capacity() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(50..=50), 50..=50, &geometry, 50_500.0);
        let (task, _) = scheduler.next_dispatch().unwrap();

        scheduler.reconcile(&pages(60..=61), 60..=61, &geometry, 60_500.0);
        assert!(scheduler.next_dispatch().is_none());

        // The late (successful) result of the cancelled render is discarded
        assert_eq!(scheduler.complete(task.generation, &ok()), CompletionVerdict::Stale);
        assert_eq!(scheduler.rendered_scale(50), None);
        assert_eq!(scheduler.next_dispatch().unwrap().0.page_index, 60);
    }

    #[test]
    fn test_scale_change_supersedes_active_render() {
        let mut scheduler = RenderScheduler::new(1);
        scheduler.reconcile(&pages(0..=0), 0..=0, &Uniform { scale: 1.0 }, 0.0);
        let (old, old_token) = scheduler.next_dispatch().unwrap();

        let report = scheduler.reconcile(&pages(0..=0), 0..=0, &Uniform { scale: 2.0 }, 0.0);
        assert_eq!(report.cancelled, vec![0]);
        assert!(old_token.is_cancelled());
        assert_eq!(scheduler.queued_pages(), vec![0]);

        assert_eq!(
            scheduler.complete(old.generation, &Err::<(), _>(RenderFailure::Cancelled)),
            CompletionVerdict::Cancelled
        );

        let (new, _) = scheduler.next_dispatch().unwrap();
        assert_eq!(new.scale, 2.0);
        assert_eq!(scheduler.complete(new.generation, &ok()), CompletionVerdict::Accepted);
        assert_eq!(scheduler.rendered_scale(0), Some(2.0));
    }

    #[test]
    fn test_stale_scale_counts_as_unrendered() {
        let mut scheduler = RenderScheduler::new(1);
        scheduler.reconcile(&pages(0..=0), 0..=0, &Uniform { scale: 1.0 }, 0.0);
        let (task, _) = scheduler.next_dispatch().unwrap();
        scheduler.complete(task.generation, &ok());

        let report = scheduler.reconcile(&pages(0..=0), 0..=0, &Uniform { scale: 1.5 }, 0.0);
        assert_eq!(report.enqueued, vec![0]);
    }

    #[test]
    fn test_at_most_one_active_render_per_page() {
        let mut scheduler = RenderScheduler::new(4);
        let scales = [1.0, 1.25, 1.5, 1.0, 2.0];

        for (step, scale) in scales.iter().enumerate() {
            let geometry = Uniform { scale: *scale };
            let start = step as u32;
            scheduler.reconcile(&pages(start..=start + 3), start..=start + 1, &geometry, 0.0);
            while scheduler.next_dispatch().is_some() {}

            let active = scheduler.active_pages();
            let unique: BTreeSet<u32> = active.iter().copied().collect();
            assert_eq!(active.len(), unique.len());
        }
    }

    #[test]
    fn test_failed_page_not_retried_until_it_reenters() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=0), 0..=0, &geometry, 0.0);
        let (task, _) = scheduler.next_dispatch().unwrap();

        let failure = Err::<(), _>(RenderFailure::Failed("corrupt stream".into()));
        assert_eq!(scheduler.complete(task.generation, &failure), CompletionVerdict::Failed);
        assert!(scheduler.has_failed(0));

        scheduler.reconcile(&pages(0..=0), 0..=0, &geometry, 0.0);
        assert!(scheduler.queued_pages().is_empty());

        // Leaves, then re-enters
        scheduler.reconcile(&pages(5..=5), 5..=5, &geometry, 0.0);
        scheduler.reconcile(&pages(0..=0), 0..=0, &geometry, 0.0);
        assert_eq!(scheduler.queued_pages(), vec![0]);
    }

    #[test]
    fn test_release_page_cancels_and_forgets() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=1), 0..=1, &geometry, 0.0);
        let (_, token) = scheduler.next_dispatch().unwrap();

        assert!(scheduler.release_page(0));
        assert!(token.is_cancelled());
        assert!(!scheduler.release_page(1));
        assert!(scheduler.queued_pages().is_empty());
    }

    #[test]
    fn test_unknown_generation_is_stale() {
        let mut scheduler = RenderScheduler::new(1);
        assert_eq!(scheduler.complete(99, &ok()), CompletionVerdict::Stale);
        assert_eq!(scheduler.stats().stale_results, 1);
    }

    #[test]
    fn test_cancel_all_and_invalidate() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=4), 0..=1, &geometry, 0.0);
        let (task, _) = scheduler.next_dispatch().unwrap();

        assert_eq!(scheduler.cancel_all(), 1);
        assert!(scheduler.queued_pages().is_empty());
        assert!(!scheduler.is_idle());
        scheduler.complete(task.generation, &Err::<(), _>(RenderFailure::Cancelled));
        assert!(scheduler.is_idle());

        scheduler.reconcile(&pages(0..=0), 0..=0, &geometry, 0.0);
        let (task, _) = scheduler.next_dispatch().unwrap();
        scheduler.complete(task.generation, &ok());
        scheduler.invalidate_all();
        let report = scheduler.reconcile(&pages(0..=0), 0..=0, &geometry, 0.0);
        assert_eq!(report.enqueued, vec![0]);
    }

    #[test]
    fn test_stats() {
        let mut scheduler = RenderScheduler::new(1);
        let geometry = Uniform { scale: 1.0 };
        scheduler.reconcile(&pages(0..=2), 0..=2, &geometry, 0.0);
        let (task, _) = scheduler.next_dispatch().unwrap();
        scheduler.complete(task.generation, &ok());

        let stats = scheduler.stats();
        assert_eq!(stats.tasks_dispatched, 1);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.queue_size, 2);
        assert_eq!(stats.in_flight, 0);
    }
}
