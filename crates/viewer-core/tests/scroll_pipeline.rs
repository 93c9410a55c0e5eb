use folio_render::{build_blank_pdf, LopdfBackend, PageDimensions, SyntheticBackend};
use folio_viewer::{
    compute_layout, ContainerSize, FitMode, FixedViewport, LayoutPolicy, ScrollBehavior,
    ScrollHost, ScrollerConfig, ScrollerEvent, ScrollerState, VirtualScroller,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(20);

fn fit_width_config() -> ScrollerConfig {
    ScrollerConfig::default()
        .with_policy(LayoutPolicy::fit(FitMode::FitWidth))
        .with_padding(0.0, 0.0)
        .with_dimension_batch_size(1000)
}

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= expected.abs() * 1e-9 + 1e-6
}

#[test]
fn thousand_page_document_fits_container_width() {
    let backend = SyntheticBackend::uniform(1000, 600.0, 800.0);
    let mut scroller =
        VirtualScroller::new(Arc::new(backend), FixedViewport::new(800.0, 600.0), fit_width_config())
            .unwrap();
    scroller.init().unwrap();

    let layout = scroller.layout();
    assert_eq!(layout.page_count(), 1000);

    let page = layout.page(500).unwrap();
    let scale = 800.0 / 600.0;
    let height = 800.0 * scale;
    assert!(approx(page.scale, scale));
    assert!(approx(page.css_height, height));
    assert!(approx(page.y_offset, 12.0 + 500.0 * (height + 12.0)));
    assert!(approx(layout.total_height(), 12.0 + 1000.0 * (height + 12.0)));
    assert!(approx(scroller.host().content_height(), layout.total_height()));

    // Only the first page and its buffer have slots
    assert_eq!(scroller.slot_pages(), vec![0, 1, 2, 3]);
    assert!(scroller.wait_idle(WAIT));
}

#[test]
fn jump_to_last_page_abandons_work_at_the_start() {
    let backend =
        SyntheticBackend::uniform(1000, 600.0, 800.0).with_render_delay(Duration::from_millis(100));
    let mut scroller =
        VirtualScroller::new(Arc::new(backend), FixedViewport::new(800.0, 600.0), fit_width_config())
            .unwrap();
    scroller.init().unwrap();

    // Page 0 is rendering; pages 1 to 3 are queued behind it
    assert_eq!(scroller.scheduler().active_pages(), vec![0]);

    scroller.scroll_to_page(999, false);
    scroller.on_scroll();
    assert!(scroller.wait_idle(WAIT));

    let range = scroller.range().unwrap();
    assert_eq!(range.visible(), 999..=999);
    assert_eq!(range.buffer(), 996..=999);
    assert_eq!(scroller.current_page(), Some(999));
    assert_eq!(scroller.slot_pages(), vec![996, 997, 998, 999]);
    assert!(scroller.slot(0).is_none());

    let stats = scroller.stats();
    assert_eq!(stats.scheduler.tasks_cancelled, 1);
    assert_eq!(stats.scheduler.tasks_completed, 4);
    assert_eq!(stats.scheduler.tasks_dispatched, 5);
    assert_eq!(scroller.backend().render_count(), 4);
    for page in 996..=999 {
        assert!(!scroller.slot(page).unwrap().is_placeholder());
    }
}

#[test]
fn background_dimensions_converge_to_the_full_layout() {
    let sizes: Vec<PageDimensions> = (0..120)
        .map(|page| {
            if page % 3 == 0 {
                PageDimensions::new(842.0, 595.0)
            } else {
                PageDimensions::new(595.0, 842.0)
            }
        })
        .collect();
    let config = ScrollerConfig::default()
        .with_policy(LayoutPolicy::fixed(1.0))
        .with_dimension_batch_size(16);
    let mut scroller = VirtualScroller::new(
        Arc::new(SyntheticBackend::from_sizes(sizes.clone())),
        FixedViewport::new(900.0, 700.0),
        config.clone(),
    )
    .unwrap();
    scroller.init().unwrap();

    assert!(scroller.wait_idle(WAIT));
    assert!(scroller.dimensions_complete());
    assert_eq!(scroller.stats().dimensions_known, 120);

    let expected = compute_layout(
        &sizes,
        LayoutPolicy::fixed(1.0),
        ContainerSize::new(900.0, 700.0),
        &config.geometry_options(),
    );
    assert_eq!(*scroller.layout(), expected);
}

#[test]
fn scrolling_through_the_document_reports_each_page_once() {
    let config = ScrollerConfig::default()
        .with_policy(LayoutPolicy::fixed(1.0))
        .with_dimension_batch_size(1000);
    let mut scroller = VirtualScroller::new(
        Arc::new(SyntheticBackend::uniform(10, 600.0, 800.0)),
        FixedViewport::new(800.0, 600.0),
        config,
    )
    .unwrap();
    let events = scroller.subscribe();
    scroller.init().unwrap();

    let mut top = 0.0;
    while top < scroller.host().max_scroll_top() {
        top += 200.0;
        scroller.host_mut().scroll_to(top, ScrollBehavior::Instant);
        scroller.on_scroll();
        scroller.on_frame();
    }
    assert!(scroller.wait_idle(WAIT));

    let pages: Vec<u32> = events
        .try_iter()
        .filter_map(|event| match event {
            ScrollerEvent::CurrentPageChanged(page) => Some(page),
            ScrollerEvent::RenderFailed { .. } => None,
        })
        .collect();
    assert_eq!(pages, (0..10).collect::<Vec<_>>());

    // Live slots never exceed the visible pages plus three on each side
    assert!(scroller.slot_pages().len() <= 2 + 6);
    assert_eq!(scroller.stats().slots.live_slots, scroller.slot_pages().len());
}

#[test]
fn pdf_document_renders_at_mediabox_size() {
    let bytes = build_blank_pdf(&[(300, 400), (400, 300), (300, 400)]).unwrap();
    let backend = LopdfBackend::open(bytes).unwrap();
    let config = ScrollerConfig::default()
        .with_policy(LayoutPolicy::fixed(2.0))
        .with_device_pixel_ratio(1.5);
    let mut scroller =
        VirtualScroller::new(Arc::new(backend), FixedViewport::new(1000.0, 900.0), config).unwrap();
    scroller.init().unwrap();
    assert!(scroller.wait_idle(WAIT));

    let layout = scroller.layout();
    assert_eq!(layout.page(1).unwrap().css_width, 800.0);
    assert_eq!(layout.page(1).unwrap().y_offset, 12.0 + 800.0 + 12.0);

    let slot = scroller.slot(1).unwrap();
    assert_eq!(slot.rendered_scale(), Some(2.0));
    assert_eq!(slot.surface().width(), 1200);
    assert_eq!(slot.surface().height(), 900);
    assert_eq!(slot.surface_bytes(), 1200 * 900 * 4);
}

#[test]
fn destroy_releases_every_surface_and_detaches_subscribers() {
    let mut scroller = VirtualScroller::new(
        Arc::new(SyntheticBackend::uniform(40, 600.0, 800.0)),
        FixedViewport::new(800.0, 600.0),
        ScrollerConfig::default().with_policy(LayoutPolicy::fixed(1.0)),
    )
    .unwrap();
    let events = scroller.subscribe();
    scroller.init().unwrap();
    assert!(scroller.wait_idle(WAIT));
    let resident = scroller.stats().slots.resident_bytes;
    assert!(resident > 0);

    scroller.destroy();
    scroller.destroy();

    assert_eq!(scroller.state(), ScrollerState::Destroyed);
    assert!(scroller.slot_pages().is_empty());
    let stats = scroller.stats();
    assert_eq!(stats.slots.resident_bytes, 0);
    assert_eq!(stats.slots.released_bytes, resident as u64);

    // The sender side is gone, so draining finishes
    let drained: BTreeSet<u32> = events
        .iter()
        .filter_map(|event| match event {
            ScrollerEvent::CurrentPageChanged(page) => Some(page),
            ScrollerEvent::RenderFailed { .. } => None,
        })
        .collect();
    assert_eq!(drained, BTreeSet::from([0]));

    // Calls after destroy are ignored
    scroller.on_scroll();
    scroller.on_frame();
    scroller.set_zoom(2.0, FitMode::Fixed);
    assert!(scroller.range().is_none());
}
