//! Progressive page-dimension loading
//!
//! Opening a 1000 page document should not wait for every page size. The
//! first batch is fetched synchronously so the initial layout is exact where
//! the user is looking; the rest is fetched on a background thread and
//! published in batches that the owner merges into a [`DimensionTable`].

use crate::backend::{BackendError, DecodingBackend, PageDimensions};
use folio_scheduler::CancellationToken;
use std::io;
use std::ops::Range;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Dimensions of a contiguous run of pages
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionBatch {
    pub start: u32,
    pub dimensions: Vec<PageDimensions>,
}

impl DimensionBatch {
    pub fn end(&self) -> u32 {
        self.start + self.dimensions.len() as u32
    }
}

/// Page sizes known so far
///
/// Entries are immutable once known; merging a batch never overwrites them.
#[derive(Debug, Clone, Default)]
pub struct DimensionTable {
    entries: Vec<Option<PageDimensions>>,
}

impl DimensionTable {
    pub fn new(page_count: u32) -> Self {
        Self { entries: vec![None; page_count as usize] }
    }

    pub fn page_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Merge a batch, returning how many pages became known
    pub fn merge(&mut self, batch: &DimensionBatch) -> usize {
        let mut added = 0;
        for (offset, dimensions) in batch.dimensions.iter().enumerate() {
            let index = batch.start as usize + offset;
            match self.entries.get_mut(index) {
                Some(entry) if entry.is_none() => {
                    *entry = Some(dimensions.sanitized());
                    added += 1;
                }
                _ => {}
            }
        }
        added
    }

    pub fn get(&self, page_index: u32) -> Option<PageDimensions> {
        self.entries.get(page_index as usize).copied().flatten()
    }

    pub fn known_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    /// Dimensions for every page, with the fallback size for unknown pages
    pub fn resolved(&self) -> Vec<PageDimensions> {
        self.entries.iter().map(|entry| entry.unwrap_or_else(PageDimensions::fallback)).collect()
    }
}

/// Fetch dimensions for a range of pages, failing on the first error
pub fn fetch_dimensions<B: DecodingBackend + ?Sized>(
    backend: &B,
    pages: Range<u32>,
) -> Result<DimensionBatch, BackendError> {
    let start = pages.start;
    let dimensions =
        pages.map(|page| backend.page_dimensions(page)).collect::<Result<Vec<_>, _>>()?;
    Ok(DimensionBatch { start, dimensions })
}

/// Background thread fetching the remaining page dimensions
///
/// Pages whose size cannot be read are published with the fallback size.
/// Dropping the loader stops it after the page it is reading.
pub struct DimensionLoader {
    batches: Receiver<DimensionBatch>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DimensionLoader {
    /// Spawn a loader for `pages`, publishing every `batch_size` pages
    pub fn spawn<B: DecodingBackend + ?Sized + 'static>(
        backend: Arc<B>,
        pages: Range<u32>,
        batch_size: usize,
    ) -> io::Result<Self> {
        let (sender, batches) = mpsc::channel();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let batch_size = batch_size.max(1);

        let handle = thread::Builder::new().name("folio-dimensions".to_owned()).spawn(move || {
            let mut batch = DimensionBatch { start: pages.start, dimensions: Vec::new() };
            for page in pages {
                if worker_token.is_cancelled() {
                    return;
                }
                let dimensions = backend.page_dimensions(page).unwrap_or_else(|error| {
                    tracing::warn!(page, %error, "page dimensions unavailable, using fallback");
                    PageDimensions::fallback()
                });
                batch.dimensions.push(dimensions);

                if batch.dimensions.len() >= batch_size {
                    let next = DimensionBatch { start: page + 1, dimensions: Vec::new() };
                    if sender.send(std::mem::replace(&mut batch, next)).is_err() {
                        return;
                    }
                }
            }
            if !batch.dimensions.is_empty() {
                let _ = sender.send(batch);
            }
        })?;

        Ok(Self { batches, token, handle: Some(handle) })
    }

    /// Take every batch published since the last call
    ///
    /// Returns `None` once the loader has finished and everything was taken.
    pub fn drain(&self) -> Option<Vec<DimensionBatch>> {
        let mut batches = Vec::new();
        loop {
            match self.batches.try_recv() {
                Ok(batch) => batches.push(batch),
                Err(TryRecvError::Empty) => return Some(batches),
                Err(TryRecvError::Disconnected) => {
                    return if batches.is_empty() { None } else { Some(batches) };
                }
            }
        }
    }

    /// Block until the next batch, or `None` once the loader is done
    pub fn recv(&self) -> Option<DimensionBatch> {
        self.batches.recv().ok()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the loader and wait for its thread to exit
    pub fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("dimension loader exited with a panic");
            }
        }
    }
}

impl Drop for DimensionLoader {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
