//! Virtual scroller
//!
//! Ties the pipeline together. Host events (scroll, resize, animation
//! frame, zoom) flow in; each reconciliation derives the viewport range,
//! syncs slots, and reconciles the render queue. Renders run on the worker
//! pool and come back through [`VirtualScroller::poll`], where each result
//! is checked against its generation and its slot before any pixels are
//! written.

use crate::config::ScrollerConfig;
use crate::error::ScrollerError;
use crate::events::{EventHub, ScrollerEvent};
use crate::geometry::{compute_layout, FitMode, LayoutPolicy, LayoutTable};
use crate::host::{ScrollBehavior, ScrollHost};
use crate::slots::{Slot, SlotManager, SlotStats};
use crate::viewport::{current_page, get_range, ViewportRange};
use crate::zoom::{clamp_zoom, zoom_in_from, zoom_out_from};
use folio_render::{
    fetch_dimensions, DecodingBackend, DimensionLoader, DimensionTable, RenderRequest, RgbaImage,
};
use folio_scheduler::{
    CancellationToken, CompletionVerdict, FrameBudget, FrameCoalescer, RenderCompletion,
    RenderExecutor, RenderFailure, RenderScheduler, RenderTask, RenderWorkerPool, SchedulerStats,
    WorkerPoolConfig,
};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Longest single wait inside `wait_idle`, so dimension batches and frames
// keep being processed while renders run.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollerState {
    Uninitialized,
    LaidOut,
    Destroyed,
}

/// Output of one page render
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RgbaImage,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollerStats {
    pub page_count: u32,
    pub dimensions_known: usize,
    pub frames: u64,
    pub absorbed_requests: u64,
    pub relayouts: u64,
    pub scheduler: SchedulerStats,
    pub slots: SlotStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollAnchor {
    /// Keep scroll top at the same fraction of the total height
    Fraction,
    /// Keep the page at the top of the viewport where it was
    TopPage,
}

/// Orchestrator of the virtual scrolling pipeline
///
/// Single-threaded: every method is called from the host's UI thread.
/// Event handlers never fail; problems are logged.
pub struct VirtualScroller<B: DecodingBackend + 'static, H: ScrollHost> {
    backend: Arc<B>,
    host: H,
    config: ScrollerConfig,
    policy: LayoutPolicy,
    state: ScrollerState,
    dimensions: DimensionTable,
    loader: Option<DimensionLoader>,
    layout: Arc<LayoutTable>,
    range: Option<ViewportRange>,
    current_page: Option<u32>,
    scheduler: RenderScheduler,
    slots: SlotManager,
    pool: Option<RenderWorkerPool<RenderedPage>>,
    frames: FrameCoalescer,
    events: EventHub,
    relayouts: u64,
}

impl<B: DecodingBackend + 'static, H: ScrollHost> VirtualScroller<B, H> {
    /// Create a scroller; nothing is loaded until [`Self::init`]
    pub fn new(backend: Arc<B>, host: H, config: ScrollerConfig) -> Result<Self, ScrollerError> {
        config.validate()?;
        Ok(Self {
            backend,
            host,
            policy: config.policy(),
            scheduler: RenderScheduler::new(config.max_concurrent_renders),
            config,
            state: ScrollerState::Uninitialized,
            dimensions: DimensionTable::default(),
            loader: None,
            layout: Arc::new(LayoutTable::default()),
            range: None,
            current_page: None,
            slots: SlotManager::new(),
            pool: None,
            frames: FrameCoalescer::new(),
            events: EventHub::new(),
            relayouts: 0,
        })
    }

    /// Load the document and lay it out
    ///
    /// The first batch of page sizes is read synchronously. A failure there
    /// is fatal and leaves the scroller uninitialized. The remaining sizes
    /// load in the background and pages use the fallback size until known.
    pub fn init(&mut self) -> Result<(), ScrollerError> {
        match self.state {
            ScrollerState::Uninitialized => {}
            ScrollerState::LaidOut => return Err(ScrollerError::AlreadyInitialized),
            ScrollerState::Destroyed => return Err(ScrollerError::Destroyed),
        }

        let page_count = self.backend.page_count();
        let first = page_count.min(self.config.dimension_batch_size as u32);
        let batch = fetch_dimensions(&*self.backend, 0..first)?;

        let pool = RenderWorkerPool::new(
            self.render_executor(),
            WorkerPoolConfig::new(self.config.max_concurrent_renders),
        )?;
        let loader = if first < page_count {
            Some(DimensionLoader::spawn(
                Arc::clone(&self.backend),
                first..page_count,
                self.config.dimension_batch_size,
            )?)
        } else {
            None
        };

        let mut dimensions = DimensionTable::new(page_count);
        dimensions.merge(&batch);
        self.dimensions = dimensions;
        self.loader = loader;
        self.pool = Some(pool);
        self.state = ScrollerState::LaidOut;

        tracing::debug!(pages = page_count, known = first, "scroller initialized");

        self.relayout(ScrollAnchor::Fraction);
        self.reconcile();
        self.dispatch();
        Ok(())
    }

    fn render_executor(&self) -> RenderExecutor<RenderedPage> {
        let backend = Arc::clone(&self.backend);
        let device_pixel_ratio = self.config.device_pixel_ratio;
        let text_layer = self.config.text_layer;

        Arc::new(move |task: &RenderTask, token: &CancellationToken| {
            let request = RenderRequest::new(task.page_index, task.scale)
                .with_device_pixel_ratio(device_pixel_ratio);
            let image = backend.render_page(request, token)?;

            let text = if text_layer {
                token.check()?;
                match backend.text_content(task.page_index) {
                    Ok(text) => Some(text),
                    Err(error) => {
                        tracing::debug!(page = task.page_index, %error, "text layer unavailable");
                        None
                    }
                }
            } else {
                None
            };

            Ok::<_, RenderFailure>(RenderedPage { image, text })
        })
    }

    /// The scroll position changed
    pub fn on_scroll(&mut self) {
        if self.state == ScrollerState::LaidOut {
            self.frames.request();
        }
    }

    /// The container size changed
    pub fn on_resize(&mut self) {
        if self.state == ScrollerState::LaidOut {
            self.frames.request_relayout();
        }
    }

    /// Run the work of one animation frame
    ///
    /// Merges page sizes that arrived in the background, performs at most
    /// one reconciliation for all events since the last frame, then applies
    /// finished renders within the frame budget.
    pub fn on_frame(&mut self) {
        if self.state != ScrollerState::LaidOut {
            return;
        }

        let budget = FrameBudget::for_60fps();
        let dimensions_changed = self.merge_dimensions();

        match self.frames.take() {
            Some(work) if work.relayout => {
                self.relayout(ScrollAnchor::Fraction);
                self.reconcile();
            }
            Some(work) => {
                if dimensions_changed {
                    self.relayout(ScrollAnchor::TopPage);
                }
                if work.reconcile || dimensions_changed {
                    self.reconcile();
                }
            }
            None if dimensions_changed => {
                self.relayout(ScrollAnchor::TopPage);
                self.reconcile();
            }
            None => {}
        }

        self.poll_within(&budget);
    }

    /// Change zoom or fit mode
    ///
    /// Fixed scales are clamped to the zoom range; fit modes reset the fixed
    /// scale to 1. The scroll position is kept at the same fraction of the
    /// document. Existing pixels stay visible until re-rendered.
    pub fn set_zoom(&mut self, scale: f64, fit_mode: FitMode) {
        let policy = match fit_mode {
            FitMode::Fixed => LayoutPolicy::fixed(clamp_zoom(scale)),
            mode => LayoutPolicy::fit(mode),
        };

        match self.state {
            ScrollerState::Destroyed => {}
            ScrollerState::Uninitialized => self.policy = policy,
            ScrollerState::LaidOut => {
                if policy == self.policy {
                    return;
                }
                self.policy = policy;
                tracing::debug!(mode = ?policy.mode, scale = policy.scale, "zoom changed");
                self.relayout(ScrollAnchor::Fraction);
                self.reconcile();
                self.dispatch();
            }
        }
    }

    pub fn zoom_in(&mut self) {
        let next = zoom_in_from(self.zoom());
        self.set_zoom(next, FitMode::Fixed);
    }

    pub fn zoom_out(&mut self) {
        let next = zoom_out_from(self.zoom());
        self.set_zoom(next, FitMode::Fixed);
    }

    /// Effective scale of the current page, or the fixed scale
    pub fn zoom(&self) -> f64 {
        if self.policy.mode == FitMode::Fixed {
            return self.policy.scale;
        }
        self.current_page
            .and_then(|page| self.layout.page(page))
            .map_or(self.policy.scale, |page| page.scale)
    }

    /// Ask the host to scroll a page into view
    ///
    /// Nothing is rendered here; the host's resulting scroll event drives
    /// reconciliation.
    pub fn scroll_to_page(&mut self, page_index: u32, smooth: bool) {
        if self.state != ScrollerState::LaidOut {
            return;
        }
        let Some(top) = self.layout.scroll_offset_for(page_index, self.config.scroll_margin) else {
            tracing::debug!(page = page_index, pages = self.layout.page_count(), "scroll target out of range");
            return;
        };
        let behavior = if smooth { ScrollBehavior::Smooth } else { ScrollBehavior::Instant };
        self.host.scroll_to(top, behavior);
    }

    /// Re-render every live page; current pixels stay until replaced
    pub fn refresh(&mut self) {
        if self.state != ScrollerState::LaidOut {
            return;
        }
        self.scheduler.invalidate_all();
        self.reconcile();
        self.dispatch();
    }

    /// Apply every finished render and dispatch more work
    ///
    /// Returns the number of renders written into slots.
    pub fn poll(&mut self) -> usize {
        self.poll_within(&FrameBudget::unlimited())
    }

    /// Drive the scroller until nothing is queued, rendering, or loading
    ///
    /// Blocks the calling thread. Returns `false` if `timeout` ran out first.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.on_frame();
            if self.is_idle() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            let completion = self
                .pool
                .as_ref()
                .and_then(|pool| pool.recv_timeout(remaining.min(IDLE_POLL_INTERVAL)));
            if let Some(completion) = completion {
                self.handle_completion(completion);
            }
        }
    }

    /// Tear everything down; later calls do nothing
    ///
    /// Cancels all renders, stops the dimension loader, destroys every slot
    /// and detaches subscribers. Never waits on a worker: a render still
    /// running finishes on its own thread and its result is dropped.
    pub fn destroy(&mut self) {
        if self.state == ScrollerState::Destroyed {
            return;
        }

        let cancelled = self.scheduler.cancel_all();
        self.frames.cancel();
        if let Some(loader) = self.loader.take() {
            loader.cancel();
        }
        let destroyed = self.slots.destroy_all();
        // Dropping the pool closes its queue; busy workers are detached.
        drop(self.pool.take());
        self.events.clear();
        self.range = None;
        self.current_page = None;
        self.state = ScrollerState::Destroyed;

        tracing::debug!(cancelled, slots = destroyed, "scroller destroyed");
    }

    /// Receive [`ScrollerEvent`]s; the channel disconnects on destroy
    pub fn subscribe(&mut self) -> Receiver<ScrollerEvent> {
        if self.state == ScrollerState::Destroyed {
            let (_, receiver) = mpsc::channel();
            return receiver;
        }
        self.events.subscribe()
    }

    pub fn state(&self) -> ScrollerState {
        self.state
    }

    pub fn current_page(&self) -> Option<u32> {
        self.current_page
    }

    pub fn range(&self) -> Option<ViewportRange> {
        self.range
    }

    pub fn layout(&self) -> Arc<LayoutTable> {
        Arc::clone(&self.layout)
    }

    pub fn slot(&self, page_index: u32) -> Option<&Slot> {
        self.slots.slot(page_index)
    }

    pub fn slot_pages(&self) -> Vec<u32> {
        self.slots.pages()
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    pub fn config(&self) -> &ScrollerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Check if every page's real size is known
    pub fn dimensions_complete(&self) -> bool {
        self.loader.is_none() && self.dimensions.is_complete()
    }

    pub fn is_idle(&self) -> bool {
        self.state != ScrollerState::LaidOut
            || (self.scheduler.is_idle() && self.loader.is_none() && !self.frames.is_pending())
    }

    pub fn stats(&self) -> ScrollerStats {
        ScrollerStats {
            page_count: self.dimensions.page_count(),
            dimensions_known: self.dimensions.known_count(),
            frames: self.frames.frames(),
            absorbed_requests: self.frames.absorbed(),
            relayouts: self.relayouts,
            scheduler: self.scheduler.stats(),
            slots: self.slots.stats(),
        }
    }

    fn merge_dimensions(&mut self) -> bool {
        let Some(loader) = self.loader.as_ref() else {
            return false;
        };

        let mut added = 0;
        match loader.drain() {
            Some(batches) => {
                for batch in &batches {
                    added += self.dimensions.merge(batch);
                }
            }
            None => {
                if let Some(loader) = self.loader.take() {
                    loader.stop();
                }
                tracing::debug!(known = self.dimensions.known_count(), "page dimensions loaded");
            }
        }
        added > 0
    }

    fn relayout(&mut self, anchor: ScrollAnchor) {
        let old_total = self.layout.total_height();
        let scroll_top = self.host.scroll_top();
        let anchor_page = self
            .layout
            .find_page_at(scroll_top)
            .and_then(|page| self.layout.page(page).map(|layout| (page, scroll_top - layout.y_offset)));

        let container = self.host.client_size();
        let layout = compute_layout(
            &self.dimensions.resolved(),
            self.policy,
            container,
            &self.config.geometry_options(),
        );
        self.layout = Arc::new(layout);
        self.relayouts += 1;
        self.host.set_content_height(self.layout.total_height());

        if old_total > 0.0 {
            let target = match (anchor, anchor_page) {
                (ScrollAnchor::TopPage, Some((page, offset))) => self
                    .layout
                    .page(page)
                    .map_or(scroll_top, |layout| layout.y_offset + offset),
                _ => scroll_top / old_total * self.layout.total_height(),
            };
            if (target - scroll_top).abs() > f64::EPSILON {
                self.host.scroll_to(target, ScrollBehavior::Instant);
            }
        }

        tracing::trace!(
            pages = self.layout.page_count(),
            total_height = self.layout.total_height(),
            width = container.width,
            height = container.height,
            "layout computed"
        );
    }

    fn reconcile(&mut self) {
        let scroll_top = self.host.scroll_top();
        let client_height = self.host.client_size().height;

        let Some(range) =
            get_range(&self.layout, scroll_top, client_height, self.config.buffer_pages)
        else {
            self.range = None;
            return;
        };
        self.range = Some(range);

        self.slots.sync(&range, &self.layout, &mut self.scheduler);
        self.scheduler.reconcile(
            &range.needed(),
            range.visible(),
            &*self.layout,
            scroll_top + client_height / 2.0,
        );

        let page = current_page(
            &self.layout,
            scroll_top,
            client_height,
            self.config.current_page_fraction,
        );
        if page != self.current_page {
            self.current_page = page;
            if let Some(page) = page {
                self.events.emit(ScrollerEvent::CurrentPageChanged(page));
            }
        }
    }

    fn dispatch(&mut self) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        while let Some((task, token)) = self.scheduler.next_dispatch() {
            let generation = task.generation;
            if !pool.submit(task, token) {
                tracing::warn!(generation, "render pool unavailable");
                let failure = Err::<(), _>(RenderFailure::Failed("render pool unavailable".to_owned()));
                self.scheduler.complete(generation, &failure);
                break;
            }
        }
    }

    fn poll_within(&mut self, budget: &FrameBudget) -> usize {
        if self.state != ScrollerState::LaidOut {
            return 0;
        }

        let mut applied = 0;
        while !budget.is_exceeded() {
            let Some(completion) = self.pool.as_ref().and_then(RenderWorkerPool::try_recv) else {
                break;
            };
            if self.handle_completion(completion) {
                applied += 1;
            }
        }
        self.dispatch();
        applied
    }

    fn handle_completion(&mut self, completion: RenderCompletion<RenderedPage>) -> bool {
        let RenderCompletion { task, result } = completion;
        let verdict = self.scheduler.complete(task.generation, &result);

        let applied = match (verdict, result) {
            (CompletionVerdict::Accepted, Ok(rendered)) => {
                let applied = self.slots.apply_render(task.page_index, task.scale, rendered.image);
                if applied {
                    if let Some(text) = rendered.text {
                        self.slots.set_text_layer(task.page_index, text);
                    }
                }
                applied
            }
            (CompletionVerdict::Failed, Err(RenderFailure::Failed(reason))) => {
                self.events.emit(ScrollerEvent::RenderFailed { page_index: task.page_index, reason });
                false
            }
            (verdict, _) => {
                tracing::trace!(page = task.page_index, generation = task.generation, ?verdict, "render discarded");
                false
            }
        };

        self.dispatch();
        applied
    }
}

impl<B: DecodingBackend + 'static, H: ScrollHost> Drop for VirtualScroller<B, H> {
    fn drop(&mut self) {
        self.destroy();
    }
}
