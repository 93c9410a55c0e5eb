//! Generated documents for demos and tests
//!
//! A [`SyntheticBackend`] has no file behind it. Page sizes are given up
//! front, renders produce a tinted page at the requested pixel size, and
//! individual pages can be made to fail or to take a while.

use crate::backend::{
    check_page, paint_blank_page, BackendError, DecodingBackend, PageDimensions, RenderRequest,
    RgbaImage,
};
use folio_scheduler::CancellationToken;
use image::Rgba;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const DELAY_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct SyntheticBackend {
    pages: Vec<PageDimensions>,
    failing_renders: HashSet<u32>,
    failing_dimensions: HashSet<u32>,
    render_delay: Duration,
    renders: AtomicUsize,
}

impl SyntheticBackend {
    /// `page_count` pages of the same size
    pub fn uniform(page_count: u32, width: f64, height: f64) -> Self {
        Self::from_sizes(vec![PageDimensions::new(width, height); page_count as usize])
    }

    pub fn from_sizes(pages: Vec<PageDimensions>) -> Self {
        Self {
            pages,
            failing_renders: HashSet::new(),
            failing_dimensions: HashSet::new(),
            render_delay: Duration::ZERO,
            renders: AtomicUsize::new(0),
        }
    }

    /// Make renders of these pages fail
    pub fn with_failing_pages(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.failing_renders.extend(pages);
        self
    }

    /// Make dimension lookups of these pages fail
    pub fn with_failing_dimensions(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.failing_dimensions.extend(pages);
        self
    }

    /// Make every render take at least `delay`
    ///
    /// The delay is spent in short slices so cancellation stays prompt.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Number of renders that ran to completion
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }

    fn wait(&self, token: &CancellationToken) -> Result<(), BackendError> {
        let mut remaining = self.render_delay;
        while !remaining.is_zero() {
            token.check()?;
            let slice = remaining.min(DELAY_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
        Ok(())
    }
}

impl DecodingBackend for SyntheticBackend {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_dimensions(&self, page_index: u32) -> Result<PageDimensions, BackendError> {
        check_page(page_index, self.page_count())?;
        if self.failing_dimensions.contains(&page_index) {
            return Err(BackendError::Backend(format!("no dimensions for page {page_index}")));
        }
        Ok(self.pages[page_index as usize])
    }

    fn render_page(
        &self,
        request: RenderRequest,
        token: &CancellationToken,
    ) -> Result<RgbaImage, BackendError> {
        check_page(request.page_index, self.page_count())?;
        self.wait(token)?;

        if self.failing_renders.contains(&request.page_index) {
            return Err(BackendError::Backend(format!(
                "synthetic failure on page {}",
                request.page_index
            )));
        }

        let (width, height) = request.pixel_size(self.pages[request.page_index as usize]);
        let shade = 235 + (request.page_index % 16) as u8;
        let image = paint_blank_page(width, height, Rgba([shade, shade, 255, 255]), token)?;
        self.renders.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    fn text_content(&self, page_index: u32) -> Result<String, BackendError> {
        check_page(page_index, self.page_count())?;
        Ok(format!("Page {}", page_index + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn uniform_pages_report_their_size() {
        let backend = SyntheticBackend::uniform(4, 600.0, 800.0);

        assert_eq!(backend.page_count(), 4);
        assert_eq!(backend.page_dimensions(3).unwrap(), PageDimensions::new(600.0, 800.0));
        assert!(backend.page_dimensions(4).is_err());
    }

    #[test]
    fn render_counts_successes_only() {
        let backend = SyntheticBackend::uniform(3, 10.0, 10.0).with_failing_pages([1]);
        let token = CancellationToken::new();

        assert!(backend.render_page(RenderRequest::new(0, 1.0), &token).is_ok());
        assert!(matches!(
            backend.render_page(RenderRequest::new(1, 1.0), &token),
            Err(BackendError::Backend(_))
        ));
        assert_eq!(backend.render_count(), 1);
    }

    #[test]
    fn failing_dimensions_are_reported() {
        let backend = SyntheticBackend::uniform(3, 10.0, 10.0).with_failing_dimensions([2]);
        assert!(backend.page_dimensions(1).is_ok());
        assert!(matches!(backend.page_dimensions(2), Err(BackendError::Backend(_))));
    }

    #[test]
    fn cancellation_cuts_delay_short() {
        let backend =
            SyntheticBackend::uniform(1, 10.0, 10.0).with_render_delay(Duration::from_secs(30));
        let token = CancellationToken::new();
        let canceller = token.clone();

        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = backend.render_page(RenderRequest::new(0, 1.0), &token);
        handle.join().unwrap();

        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn text_content_names_the_page() {
        let backend = SyntheticBackend::uniform(2, 10.0, 10.0);
        assert_eq!(backend.text_content(1).unwrap(), "Page 2");
    }
}
